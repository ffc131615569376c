use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::models::job::{Quality, SpeedPreset};

/// Well-known install locations searched when no env override is set.
pub const FFMPEG_FALLBACK_PATHS: &[&str] = &[
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
];

pub const GST_LAUNCH_FALLBACK_PATHS: &[&str] = &[
    "/usr/bin/gst-launch-1.0",
    "/usr/local/bin/gst-launch-1.0",
];

/// Tool used for live restreaming, selected once at startup. FFmpeg is
/// preferred; the gst-launch CLI is the fallback when only GStreamer is
/// installed.
#[derive(Debug, Clone)]
pub enum StreamBackend {
    Ffmpeg(PathBuf),
    GstLaunch(PathBuf),
}

impl StreamBackend {
    pub fn binary(&self) -> &Path {
        match self {
            Self::Ffmpeg(path) | Self::GstLaunch(path) => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ffmpeg(_) => "ffmpeg",
            Self::GstLaunch(_) => "gst-launch",
        }
    }
}

/// External encoder binaries discovered at startup. A missing binary is a
/// startup warning only; the error surfaces as a `LaunchError` when a job
/// actually needs it.
pub struct Encoders {
    ffmpeg: Option<PathBuf>,
    stream: Option<StreamBackend>,
}

impl Encoders {
    pub fn probe(config: &AppConfig) -> Self {
        let ffmpeg = locate(
            config.ffmpeg_binary_path.as_deref(),
            FFMPEG_FALLBACK_PATHS,
            "ffmpeg",
        );
        let gst = locate(
            config.gst_launch_binary_path.as_deref(),
            GST_LAUNCH_FALLBACK_PATHS,
            "gst-launch",
        );

        let stream = match (&ffmpeg, gst) {
            (Some(path), _) => Some(StreamBackend::Ffmpeg(path.clone())),
            (None, Some(path)) => {
                tracing::warn!(binary = %path.display(), "ffmpeg unavailable, restreaming via gst-launch");
                Some(StreamBackend::GstLaunch(path))
            }
            (None, None) => None,
        };

        if ffmpeg.is_none() {
            tracing::warn!("no ffmpeg binary found; transcode jobs will fail at launch");
        }
        if stream.is_none() {
            tracing::warn!("no restream backend found; stream jobs will fail at launch");
        }

        Self { ffmpeg, stream }
    }

    /// Construct from explicit paths, bypassing the probe. Used by tests and
    /// tooling that supply their own binaries.
    pub fn with_paths(ffmpeg: Option<PathBuf>, stream: Option<StreamBackend>) -> Self {
        Self { ffmpeg, stream }
    }

    pub fn ffmpeg(&self) -> Result<&Path, LaunchError> {
        self.ffmpeg
            .as_deref()
            .ok_or(LaunchError::BinaryUnavailable { role: "encoder" })
    }

    pub fn ffmpeg_available(&self) -> bool {
        self.ffmpeg.is_some()
    }

    pub fn stream_backend(&self) -> Result<&StreamBackend, LaunchError> {
        self.stream
            .as_ref()
            .ok_or(LaunchError::BinaryUnavailable { role: "restreamer" })
    }

    pub fn stream_backend_name(&self) -> Option<&'static str> {
        self.stream.as_ref().map(StreamBackend::name)
    }
}

fn locate(env_override: Option<&str>, fallbacks: &[&str], role: &str) -> Option<PathBuf> {
    if let Some(configured) = env_override {
        let path = PathBuf::from(configured);
        if !path.is_file() {
            tracing::warn!(binary = %path.display(), role, "configured binary does not exist");
        }
        return Some(path);
    }
    fallbacks
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

/// FFmpeg argument list for a one-shot file transcode: libx264 at the CRF
/// derived from the quality tier, AAC audio, container chosen by the output
/// path extension.
pub fn transcode_args(
    input: &Path,
    output: &Path,
    quality: Quality,
    preset: SpeedPreset,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        preset.as_arg().into(),
        "-crf".into(),
        quality.crf().into(),
        "-c:a".into(),
        "aac".into(),
        output.to_string_lossy().into_owned(),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no {role} binary available")]
    BinaryUnavailable { role: &'static str },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    #[error("output format {format} is not supported by the {backend} backend")]
    UnsupportedFormat {
        backend: &'static str,
        format: String,
    },

    #[error("failed to record process handle: {0}")]
    Attach(String),

    #[error("{0}")]
    InvalidInput(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcode_args_map_quality_and_preset() {
        let args = transcode_args(
            Path::new("/work/in.avi"),
            Path::new("/work/output.mp4"),
            Quality::High,
            SpeedPreset::Veryfast,
        );
        let crf_pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf_pos + 1], "18");
        let preset_pos = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[preset_pos + 1], "veryfast");
        assert_eq!(args.last().unwrap(), "/work/output.mp4");
    }

    #[test]
    fn missing_binaries_error_at_launch_time() {
        let encoders = Encoders::with_paths(None, None);
        assert!(matches!(
            encoders.ffmpeg(),
            Err(LaunchError::BinaryUnavailable { role: "encoder" })
        ));
        assert!(matches!(
            encoders.stream_backend(),
            Err(LaunchError::BinaryUnavailable { role: "restreamer" })
        ));
    }

    #[test]
    fn explicit_ffmpeg_serves_both_roles() {
        let encoders = Encoders::with_paths(
            Some(PathBuf::from("/opt/ffmpeg")),
            Some(StreamBackend::Ffmpeg(PathBuf::from("/opt/ffmpeg"))),
        );
        assert_eq!(encoders.ffmpeg().unwrap(), Path::new("/opt/ffmpeg"));
        assert_eq!(encoders.stream_backend().unwrap().name(), "ffmpeg");
    }
}
