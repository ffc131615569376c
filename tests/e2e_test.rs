use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use video_transcode::models::job::{JobInput, JobKind, JobStatus, Quality, SpeedPreset};
use video_transcode::services::encoder::Encoders;
use video_transcode::services::registry::JobRegistry;
use video_transcode::services::storage::JobStorage;
use video_transcode::services::transcode::TranscodeRunner;

fn ffmpeg_path() -> Option<PathBuf> {
    std::env::var("FFMPEG_BINARY_PATH")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            ["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"]
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
        })
}

/// End-to-end test against a real FFmpeg binary.
///
/// Synthesizes a 2-second test clip, transcodes it at medium quality with
/// the fast preset, and verifies the terminal status and output artifact.
///
/// Note: requires FFmpeg installed locally (or FFMPEG_BINARY_PATH set).
#[tokio::test]
#[ignore] // Run with: cargo test --test e2e_test -- --ignored
async fn transcode_two_second_clip_with_real_ffmpeg() {
    let ffmpeg = ffmpeg_path().expect("ffmpeg not installed");

    let tmp = tempfile::tempdir().unwrap();
    let registry = Arc::new(JobRegistry::new());
    let storage = Arc::new(JobStorage::new(tmp.path().join("work")).unwrap());
    let encoders = Arc::new(Encoders::with_paths(Some(ffmpeg.clone()), None));
    let runner = TranscodeRunner::new(registry.clone(), storage.clone(), encoders);

    let id = Uuid::new_v4();
    let dir = storage.create_job_dir(JobKind::FileTranscode, id).await.unwrap();

    // Generate the input clip with ffmpeg itself.
    let input = dir.join("source.mp4");
    let generate = tokio::process::Command::new(&ffmpeg)
        .args([
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=2:size=320x240:rate=15",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&input)
        .output()
        .await
        .expect("failed to run ffmpeg");
    assert!(generate.status.success(), "test clip generation failed");

    let job = registry
        .create(
            id,
            JobKind::FileTranscode,
            JobInput::UploadedFile(input),
            dir.join("output.mp4"),
            "mp4".into(),
            Quality::Medium,
            SpeedPreset::Fast,
        )
        .await
        .unwrap();

    runner.start(&job).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let done = loop {
        let current = registry.get(job.id).await.unwrap();
        if current.status.is_terminal() {
            break current;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "transcode did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
    };

    assert_eq!(done.status, JobStatus::Completed, "error: {:?}", done.error);
    let metadata = tokio::fs::metadata(&done.output_path).await.unwrap();
    assert!(metadata.len() > 0, "output artifact is empty");
}
