use std::path::{Path, PathBuf};
use std::str::FromStr;

use axum::body::Body;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobInput, JobKind, JobStatus, Quality, SpeedPreset};
use crate::models::transcode::{JobStatusResponse, SubmitTranscodeResponse};
use crate::routes::ApiError;
use crate::services::storage::{StatusSidecar, StorageError};

struct UploadFields {
    input_path: PathBuf,
    output_format: String,
    quality: Quality,
    preset: SpeedPreset,
}

/// POST /transcode — upload a video and queue it for transcoding.
///
/// The upload is written to the job's scratch directory in full before the
/// request returns; encoding itself happens in the background and the
/// caller polls the status endpoint.
pub async fn submit_transcode(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitTranscodeResponse>), ApiError> {
    let job_id = Uuid::new_v4();
    let dir = state
        .storage
        .create_job_dir(JobKind::FileTranscode, job_id)
        .await?;

    // No job exists yet: a rejected upload leaves nothing behind.
    let fields = match read_upload(&state, &dir, &mut multipart).await {
        Ok(fields) => fields,
        Err(err) => {
            let _ = state.storage.remove_job_dir(&dir).await;
            return Err(err);
        }
    };

    let output_path = dir.join(format!("output.{}", fields.output_format));
    let job = state
        .registry
        .create(
            job_id,
            JobKind::FileTranscode,
            JobInput::UploadedFile(fields.input_path),
            output_path,
            fields.output_format,
            fields.quality,
            fields.preset,
        )
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    state
        .storage
        .write_status(&dir, &StatusSidecar::for_status(JobStatus::Queued))
        .await?;
    metrics::counter!("transcode_jobs_total").increment(1);
    tracing::info!(job_id = %job.id, format = %job.output_format, "transcode job accepted");

    let transcoder = state.transcoder.clone();
    let launched = job.clone();
    tokio::spawn(async move {
        transcoder.start(&launched).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTranscodeResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// Drain the multipart body: stream the file field to disk, collect the
/// encoding knobs from the form fields.
async fn read_upload(
    state: &AppState,
    dir: &Path,
    multipart: &mut Multipart,
) -> Result<UploadFields, ApiError> {
    let mut input_path = None;
    let mut output_format = "mp4".to_string();
    let mut quality = Quality::default();
    let mut preset = SpeedPreset::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let filename = sanitize_filename(field.file_name());
                let path = dir.join(&filename);
                let mut file = state.storage.create_input_file(&path).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("upload aborted: {err}")))?
                {
                    file.write_all(&chunk).await.map_err(|source| StorageError::Io {
                        path: path.clone(),
                        source,
                    })?;
                }
                file.flush().await.map_err(|source| StorageError::Io {
                    path: path.clone(),
                    source,
                })?;
                input_path = Some(path);
            }
            Some("outputFormat") => {
                let value = text_field(field, "outputFormat").await?;
                if !is_safe_format(&value) {
                    return Err(ApiError::BadRequest(format!(
                        "unsupported output format: {value}"
                    )));
                }
                output_format = value;
            }
            Some("quality") => {
                let value = text_field(field, "quality").await?;
                quality = Quality::from_str(&value)
                    .map_err(|_| ApiError::BadRequest(format!("unknown quality tier: {value}")))?;
            }
            Some("preset") => {
                let value = text_field(field, "preset").await?;
                preset = SpeedPreset::from_str(&value)
                    .map_err(|_| ApiError::BadRequest(format!("unknown preset: {value}")))?;
            }
            _ => {}
        }
    }

    let input_path = input_path.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;
    Ok(UploadFields {
        input_path,
        output_format,
        quality,
        preset,
    })
}

/// GET /transcode/{job_id}/status
pub async fn get_job_status(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .registry
        .get(job_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("job {job_id} not found")))?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        progress: job.status.progress(),
        error: job.error,
    }))
}

/// GET /transcode/{job_id}/download — stream the transcoded file.
pub async fn download_output(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<Uuid>,
) -> Result<Response, ApiError> {
    let job = state
        .registry
        .get(job_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("job {job_id} not found")))?;

    if job.kind != JobKind::FileTranscode {
        return Err(ApiError::BadRequest(
            "download applies to file transcode jobs only".into(),
        ));
    }
    if job.status != JobStatus::Completed {
        return Err(ApiError::BadRequest(format!(
            "transcoding job not completed (status: {})",
            job.status
        )));
    }

    let file = tokio::fs::File::open(&job.output_path)
        .await
        .map_err(|_| ApiError::NotFound("output file not found".into()))?;
    let stream = ReaderStream::new(file);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, format!("video/{}", job.output_format))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=transcoded.{}", job.output_format),
        )
        .body(Body::from_stream(stream))
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(response)
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid {name} field: {err}")))
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(raw: Option<&str>) -> String {
    raw.and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "status.json")
        .map(str::to_string)
        .unwrap_or_else(|| "input.bin".to_string())
}

fn is_safe_format(format: &str) -> bool {
    !format.is_empty()
        && format.len() <= 8
        && format.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
