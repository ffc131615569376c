use axum::body::Body;
use axum::extract::{Form, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use garde::Validate;
use tokio_util::io::ReaderStream;
use url::Url;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobInput, JobKind, JobStatus, Quality, SpeedPreset};
use crate::models::transcode::{CreateStreamRequest, CreateStreamResponse, StopStreamResponse};
use crate::routes::ApiError;
use crate::services::playlist;
use crate::services::storage::StatusSidecar;
use crate::services::stream::sanitize_source_url;
use crate::services::monitor;

/// POST /transcode/stream — start restreaming a live source.
pub async fn create_stream(
    State(state): State<AppState>,
    Form(request): Form<CreateStreamRequest>,
) -> Result<(StatusCode, Json<CreateStreamResponse>), ApiError> {
    request
        .validate()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let source_url = sanitize_source_url(request.stream_url.trim());
    Url::parse(&source_url)
        .map_err(|err| ApiError::BadRequest(format!("invalid stream URL: {err}")))?;

    tracing::info!(
        url = %source_url,
        format = %request.output_format,
        name = request.stream_name.as_deref().unwrap_or("-"),
        "stream request received"
    );

    let stream_id = Uuid::new_v4();
    let dir = state
        .storage
        .create_job_dir(JobKind::LiveStream, stream_id)
        .await?;

    let output_path = if request.output_format == "hls" {
        dir.join(playlist::MANIFEST_NAME)
    } else {
        dir.join(format!("stream.{}", request.output_format))
    };

    let job = state
        .registry
        .create(
            stream_id,
            JobKind::LiveStream,
            JobInput::SourceUrl(source_url.clone()),
            output_path,
            request.output_format.clone(),
            Quality::Medium,
            SpeedPreset::Ultrafast,
        )
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    state
        .storage
        .write_status(&dir, &StatusSidecar::for_status(JobStatus::Initializing))
        .await?;
    metrics::counter!("stream_jobs_total").increment(1);

    let status = state.streams.start(&job, &source_url, &dir).await;
    let manifest_url = format!("/transcode/stream/{stream_id}/{}", playlist::MANIFEST_NAME);
    tracing::info!(job_id = %stream_id, status = %status, url = %manifest_url, "stream job created");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateStreamResponse {
            stream_id,
            status,
            stream_url: manifest_url,
        }),
    ))
}

/// GET /transcode/stream/{stream_id}/{file_name} — serve a manifest or
/// segment.
///
/// A missing manifest on a job that is still coming up yields a retryable
/// 202, not a 404: "not ready yet" and "never will exist" are different
/// answers.
pub async fn get_stream_file(
    State(state): State<AppState>,
    UrlPath((stream_id, file_name)): UrlPath<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let job = state
        .registry
        .get(stream_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("stream {stream_id} not found")))?;
    if job.kind != JobKind::LiveStream {
        return Err(ApiError::NotFound(format!("stream {stream_id} not found")));
    }

    // Manifest, segment, or the job's own (non-segmented) output file;
    // nothing else in the directory is reachable.
    let is_output_file = job
        .output_path
        .file_name()
        .and_then(|name| name.to_str())
        == Some(file_name.as_str());
    if !is_safe_stream_file(&file_name) && !is_output_file {
        return Err(ApiError::NotFound("stream file not found".into()));
    }

    let dir = state.storage.job_dir(JobKind::LiveStream, stream_id);
    let path = dir.join(&file_name);

    if !path.exists() {
        if file_name == playlist::MANIFEST_NAME && !job.status.is_terminal() {
            return Err(ApiError::TransientNotReady);
        }
        return Err(ApiError::NotFound("stream file not found".into()));
    }

    if file_name.ends_with(".m3u8") {
        // Fresh read so pollers always see the latest window.
        let content = tokio::fs::read(&path)
            .await
            .map_err(|_| ApiError::NotFound("stream file not found".into()))?;
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
            .header(header::CACHE_CONTROL, "no-store")
            .body(Body::from(content))
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        return Ok(response);
    }

    let content_type = if file_name.ends_with(".ts") {
        "video/mp2t".to_string()
    } else {
        format!("video/{}", job.output_format)
    };
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound("stream file not found".into()))?;
    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(response)
}

/// DELETE /transcode/stream/{stream_id} — stop a running stream. Idempotent:
/// stopping an already-terminal job still acknowledges with `stopped`.
pub async fn stop_stream(
    State(state): State<AppState>,
    UrlPath(stream_id): UrlPath<Uuid>,
) -> Result<Json<StopStreamResponse>, ApiError> {
    let job = state
        .registry
        .get(stream_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("stream {stream_id} not found")))?;
    if job.kind != JobKind::LiveStream {
        return Err(ApiError::NotFound(format!("stream {stream_id} not found")));
    }

    monitor::stop_stream(&state.registry, &state.storage, stream_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("stream {stream_id} not found")))?;

    Ok(Json(StopStreamResponse {
        stream_id,
        status: JobStatus::Stopped,
    }))
}

/// Only plain manifest/segment names are served; anything with a path
/// separator never leaves the job directory.
fn is_safe_stream_file(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && (name.ends_with(".m3u8") || name.ends_with(".ts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_file_names_are_restricted() {
        assert!(is_safe_stream_file("index.m3u8"));
        assert!(is_safe_stream_file("ab12cd34_001.ts"));
        assert!(!is_safe_stream_file("../status.json"));
        assert!(!is_safe_stream_file("status.json"));
        assert!(!is_safe_stream_file("a/b.ts"));
        assert!(!is_safe_stream_file(""));
    }
}
