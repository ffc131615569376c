use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to the FFmpeg binary. Falls back to well-known install locations.
    pub ffmpeg_binary_path: Option<String>,

    /// Path to the gst-launch binary used as the live-restream fallback.
    pub gst_launch_binary_path: Option<String>,

    /// Root directory for per-job scratch space. Defaults to
    /// `$TMPDIR/transcode_jobs`.
    pub transcode_work_dir: Option<PathBuf>,

    /// Seconds a terminal job is kept before the sweeper deletes it.
    #[serde(default = "default_retention_secs")]
    pub job_retention_secs: u64,

    /// Seconds between sweeper passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound in seconds on the wait for the first HLS segment before a
    /// stream job is reported as still initializing.
    #[serde(default = "default_stream_ready_timeout_secs")]
    pub stream_ready_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_stream_ready_timeout_secs() -> u64 {
    15
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Scratch root, defaulting under the system temp directory.
    pub fn work_dir(&self) -> PathBuf {
        self.transcode_work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("transcode_jobs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_defaults_under_tmp() {
        let config = AppConfig {
            bind_addr: default_bind_addr(),
            ffmpeg_binary_path: None,
            gst_launch_binary_path: None,
            transcode_work_dir: None,
            job_retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stream_ready_timeout_secs: default_stream_ready_timeout_secs(),
        };
        assert!(config.work_dir().ends_with("transcode_jobs"));
    }
}
