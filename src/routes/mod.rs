pub mod health;
pub mod metrics;
pub mod stream;
pub mod transcode;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::storage::StorageError;

/// Request-level error taxonomy. Asynchronous job failures never surface
/// here — they are recorded on the job and read back via the status
/// endpoint; this type covers synchronous precondition failures only.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown job id or missing artifact; a hard 404.
    #[error("{0}")]
    NotFound(String),

    /// Malformed or unacceptable request input.
    #[error("{0}")]
    BadRequest(String),

    /// Scratch storage failed before a job could be created.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The requested file does not exist *yet*: the job is still
    /// initializing. Deliberately distinct from `NotFound` so polling
    /// clients can keep retrying.
    #[error("stream initializing")]
    TransientNotReady,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(serde_json::json!({ "detail": detail }))).into_response()
            }
            Self::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "detail": detail })),
            )
                .into_response(),
            Self::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "detail": "scratch storage unavailable" })),
                )
                    .into_response()
            }
            Self::TransientNotReady => (
                StatusCode::ACCEPTED,
                [(header::CONTENT_TYPE, "text/plain")],
                "Stream initializing, please retry",
            )
                .into_response(),
        }
    }
}
