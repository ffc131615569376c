use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Form fields accompanying a stream-creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStreamRequest {
    /// Source URL (rtsp://, rtmp://, http(s)://).
    #[garde(length(min = 1, max = 2048))]
    pub stream_url: String,

    /// Output container/protocol; `hls` produces segmented output.
    #[serde(default = "default_stream_format")]
    #[garde(pattern(r"^[a-z0-9]{2,8}$"))]
    pub output_format: String,

    /// Optional display name, recorded in logs only.
    #[serde(default)]
    #[garde(inner(length(min = 1, max = 120)))]
    pub stream_name: Option<String>,
}

fn default_stream_format() -> String {
    "hls".to_string()
}

/// Response after accepting an upload for transcoding.
#[derive(Debug, Serialize)]
pub struct SubmitTranscodeResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Response for querying job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response after accepting a stream-creation request.
#[derive(Debug, Serialize)]
pub struct CreateStreamResponse {
    pub stream_id: Uuid,
    pub status: JobStatus,
    /// Relative URL of the stream manifest.
    pub stream_url: String,
}

/// Acknowledgment of a stop request. Always reports `stopped`.
#[derive(Debug, Serialize)]
pub struct StopStreamResponse {
    pub stream_id: Uuid,
    pub status: JobStatus,
}
