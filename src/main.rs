mod app_state;
mod config;
mod models;
mod routes;
mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::cleanup::CleanupSweeper;
use services::encoder::Encoders;
use services::registry::JobRegistry;
use services::storage::JobStorage;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing video-transcode server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("transcode_jobs_total", "Total file transcode jobs submitted");
    metrics::describe_counter!("stream_jobs_total", "Total live stream jobs submitted");
    metrics::describe_counter!(
        "transcode_jobs_completed_total",
        "Total jobs that completed successfully"
    );
    metrics::describe_counter!("transcode_jobs_failed_total", "Total jobs that failed");
    metrics::describe_counter!(
        "transcode_jobs_swept_total",
        "Total expired jobs removed by the cleanup sweeper"
    );
    metrics::describe_gauge!("transcode_jobs_active", "Jobs currently tracked in the registry");

    // Probe external encoder binaries; a missing binary only warns here and
    // fails the affected jobs at launch time.
    let encoders = Encoders::probe(&config);

    // Initialize scratch storage
    let work_dir = config.work_dir();
    tracing::info!(work_dir = %work_dir.display(), "Using transcode work directory");
    let storage = JobStorage::new(work_dir).expect("Failed to initialize scratch storage");

    // Create shared application state
    let registry = JobRegistry::new();
    let state = AppState::new(&config, registry, storage, encoders);

    // Start the cleanup sweeper
    CleanupSweeper::new(
        state.registry.clone(),
        state.storage.clone(),
        Duration::from_secs(config.job_retention_secs),
        Duration::from_secs(config.sweep_interval_secs),
    )
    .spawn();

    // Build API routes
    let app = Router::new()
        .route(
            "/",
            get(|| async {
                Json(serde_json::json!({
                    "message": "Video Transcode API",
                    "version": env!("CARGO_PKG_VERSION"),
                    "status": "running"
                }))
            }),
        )
        .route("/health", get(routes::health::health_check))
        .route("/transcode", post(routes::transcode::submit_transcode))
        .route(
            "/transcode/{job_id}/status",
            get(routes::transcode::get_job_status),
        )
        .route(
            "/transcode/{job_id}/download",
            get(routes::transcode::download_output),
        )
        .route("/transcode/stream", post(routes::stream::create_stream))
        .route(
            "/transcode/stream/{stream_id}/{file_name}",
            get(routes::stream::get_stream_file),
        )
        .route(
            "/transcode/stream/{stream_id}",
            delete(routes::stream::stop_stream),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024 * 1024)); // 2 GiB upload limit

    tracing::info!("Starting video-transcode on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
