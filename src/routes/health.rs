use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub storage: ComponentHealth,
    pub encoder: ComponentHealth,
    pub restreamer: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// GET /health — scratch storage writability plus encoder availability.
///
/// A missing encoder degrades the report but does not fail it: per the
/// launch contract, that error belongs to job launch time.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = match state.storage.probe_writable().await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        },
        Err(err) => ComponentHealth {
            status: "error".to_string(),
            detail: Some(err.to_string()),
        },
    };

    let encoder = if state.encoders.ffmpeg_available() {
        ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        }
    } else {
        ComponentHealth {
            status: "unavailable".to_string(),
            detail: Some("no ffmpeg binary found".to_string()),
        }
    };

    let restreamer = match state.encoders.stream_backend_name() {
        Some(backend) => ComponentHealth {
            status: "ok".to_string(),
            detail: Some(backend.to_string()),
        },
        None => ComponentHealth {
            status: "unavailable".to_string(),
            detail: Some("no restream backend found".to_string()),
        },
    };

    let healthy = storage.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            storage,
            encoder,
            restreamer,
        },
    };

    (status_code, Json(response))
}
