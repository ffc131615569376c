use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of work a job tracks: a one-shot file transcode or a continuous
/// live restream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    FileTranscode,
    LiveStream,
}

/// Status of a transcode or stream job.
///
/// Transitions are monotonic: `queued`/`initializing` → `starting` →
/// `processing`/`streaming` → one of the terminal states. Once terminal a
/// job never changes status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Initializing,
    Starting,
    Processing,
    Streaming,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Coarse progress figure mirrored into the status sidecar, matching
    /// what polling clients historically received.
    pub fn progress(self) -> Option<u8> {
        match self {
            Self::Queued | Self::Initializing | Self::Starting | Self::Processing => Some(0),
            Self::Streaming | Self::Completed => Some(100),
            Self::Failed | Self::Stopped => None,
        }
    }
}

/// Compression-quality tier, mapped to an x264 CRF value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub fn crf(self) -> &'static str {
        match self {
            Self::High => "18",
            Self::Medium => "23",
            Self::Low => "28",
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::Medium
    }
}

/// x264 encoding-speed preset ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl SpeedPreset {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl Default for SpeedPreset {
    fn default() -> Self {
        Self::Fast
    }
}

/// Input reference for a job: an uploaded file on disk or a live source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    UploadedFile(PathBuf),
    SourceUrl(String),
}

/// Snapshot of one tracked transcode or stream job.
///
/// This is the cloneable view handed out by the registry; the external
/// process handle stays inside the registry record and is never part of a
/// snapshot.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub input: JobInput,
    /// Output file for transcodes, manifest path for segmented streams.
    pub output_path: PathBuf,
    pub output_format: String,
    pub quality: Quality,
    pub preset: SpeedPreset,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(!JobStatus::Streaming.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn quality_maps_to_crf() {
        assert_eq!(Quality::High.crf(), "18");
        assert_eq!(Quality::Medium.crf(), "23");
        assert_eq!(Quality::Low.crf(), "28");
    }

    #[test]
    fn tiers_parse_from_form_values() {
        assert_eq!(Quality::from_str("medium").unwrap(), Quality::Medium);
        assert_eq!(SpeedPreset::from_str("ultrafast").unwrap(), SpeedPreset::Ultrafast);
        assert!(Quality::from_str("extreme").is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Initializing).unwrap();
        assert_eq!(json, "\"initializing\"");
    }
}
