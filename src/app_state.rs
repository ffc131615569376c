use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::services::encoder::Encoders;
use crate::services::registry::JobRegistry;
use crate::services::storage::JobStorage;
use crate::services::stream::StreamRunner;
use crate::services::transcode::TranscodeRunner;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub storage: Arc<JobStorage>,
    pub encoders: Arc<Encoders>,
    pub transcoder: Arc<TranscodeRunner>,
    pub streams: Arc<StreamRunner>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        registry: JobRegistry,
        storage: JobStorage,
        encoders: Encoders,
    ) -> Self {
        let registry = Arc::new(registry);
        let storage = Arc::new(storage);
        let encoders = Arc::new(encoders);

        let transcoder = Arc::new(TranscodeRunner::new(
            registry.clone(),
            storage.clone(),
            encoders.clone(),
        ));
        let streams = Arc::new(StreamRunner::new(
            registry.clone(),
            storage.clone(),
            encoders.clone(),
            Duration::from_secs(config.stream_ready_timeout_secs),
        ));

        Self {
            registry,
            storage,
            encoders,
            transcoder,
            streams,
        }
    }
}
