mod helpers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use video_transcode::models::job::{Job, JobInput, JobKind, JobStatus, Quality, SpeedPreset};
use video_transcode::services::cleanup::CleanupSweeper;
use video_transcode::services::encoder::{Encoders, StreamBackend};
use video_transcode::services::monitor;
use video_transcode::services::playlist;
use video_transcode::services::registry::{JobRegistry, RegistryError};
use video_transcode::services::storage::JobStorage;
use video_transcode::services::stream::StreamRunner;
use video_transcode::services::transcode::TranscodeRunner;

const POLL_STEP: Duration = Duration::from_millis(50);

async fn wait_for_terminal(registry: &JobRegistry, id: Uuid, timeout: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = registry.get(id).await.expect("job disappeared while polling");
        if job.status.is_terminal() {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {id} still {} after {timeout:?}", job.status);
        }
        tokio::time::sleep(POLL_STEP).await;
    }
}

fn transcode_stack(work: &std::path::Path, encoder: Option<PathBuf>) -> (Arc<JobRegistry>, Arc<JobStorage>, TranscodeRunner) {
    let registry = Arc::new(JobRegistry::new());
    let storage = Arc::new(JobStorage::new(work).unwrap());
    let encoders = Arc::new(Encoders::with_paths(encoder, None));
    let runner = TranscodeRunner::new(registry.clone(), storage.clone(), encoders);
    (registry, storage, runner)
}

async fn seed_upload(
    registry: &JobRegistry,
    storage: &JobStorage,
    content: &[u8],
) -> Job {
    let id = Uuid::new_v4();
    let dir = storage.create_job_dir(JobKind::FileTranscode, id).await.unwrap();
    let input = dir.join("clip.avi");
    tokio::fs::write(&input, content).await.unwrap();
    registry
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
        .unwrap()
}

#[tokio::test]
async fn transcode_job_completes_when_encoder_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = helpers::fake_encoder_ok(tmp.path());
    let (registry, storage, runner) = transcode_stack(&tmp.path().join("work"), Some(encoder));

    let job = seed_upload(&registry, &storage, b"raw video bytes").await;
    assert_eq!(job.status, JobStatus::Queued);
    runner.start(&job).await;

    let done = wait_for_terminal(&registry, job.id, Duration::from_secs(10)).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.error.is_none());

    let produced = tokio::fs::read(&done.output_path).await.unwrap();
    assert_eq!(produced, b"raw video bytes");
}

#[tokio::test]
async fn transcode_job_fails_with_diagnostic_tail_on_nonzero_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = helpers::fake_encoder_fail(tmp.path());
    let (registry, storage, runner) = transcode_stack(&tmp.path().join("work"), Some(encoder));

    let job = seed_upload(&registry, &storage, b"whatever").await;
    runner.start(&job).await;

    let done = wait_for_terminal(&registry, job.id, Duration::from_secs(10)).await;
    assert_eq!(done.status, JobStatus::Failed);
    let error = done.error.expect("failed job must carry an error message");
    assert!(error.contains("boom"), "stderr tail missing from: {error}");
}

#[tokio::test]
async fn missing_encoder_binary_fails_the_job_immediately() {
    let tmp = tempfile::tempdir().unwrap();
    let (registry, storage, runner) = transcode_stack(
        &tmp.path().join("work"),
        Some(tmp.path().join("no-such-ffmpeg")),
    );

    let job = seed_upload(&registry, &storage, b"bytes").await;
    runner.start(&job).await;

    let done = wait_for_terminal(&registry, job.id, Duration::from_secs(5)).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error.is_some());
}

fn stream_stack(
    work: &std::path::Path,
    streamer: PathBuf,
) -> (Arc<JobRegistry>, Arc<JobStorage>, StreamRunner) {
    let registry = Arc::new(JobRegistry::new());
    let storage = Arc::new(JobStorage::new(work).unwrap());
    let encoders = Arc::new(Encoders::with_paths(
        None,
        Some(StreamBackend::Ffmpeg(streamer)),
    ));
    let runner = StreamRunner::new(
        registry.clone(),
        storage.clone(),
        encoders,
        Duration::from_secs(5),
    );
    (registry, storage, runner)
}

async fn seed_stream(registry: &JobRegistry, storage: &JobStorage, url: &str) -> (Job, PathBuf) {
    let id = Uuid::new_v4();
    let dir = storage.create_job_dir(JobKind::LiveStream, id).await.unwrap();
    let job = registry
        .create(
            id,
            JobKind::LiveStream,
            JobInput::SourceUrl(url.to_string()),
            dir.join(playlist::MANIFEST_NAME),
            "hls".into(),
            Quality::Medium,
            SpeedPreset::Ultrafast,
        )
        .await
        .unwrap();
    (job, dir)
}

#[tokio::test]
async fn stream_goes_live_once_segments_appear_and_stop_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let streamer = helpers::fake_streamer(tmp.path());
    let (registry, storage, runner) = stream_stack(&tmp.path().join("work"), streamer);

    let (job, dir) = seed_stream(&registry, &storage, "rtsp://cam.local/feed").await;
    let status = runner.start(&job, "rtsp://cam.local/feed", &dir).await;
    assert_eq!(status, JobStatus::Streaming);

    // The placeholder manifest was written at launch, before any segment.
    let manifest = tokio::fs::read_to_string(dir.join(playlist::MANIFEST_NAME))
        .await
        .unwrap();
    assert!(manifest.starts_with("#EXTM3U"));

    let stopped = monitor::stop_stream(&registry, &storage, job.id).await.unwrap();
    assert_eq!(stopped, JobStatus::Stopped);
    assert_eq!(
        registry.get(job.id).await.unwrap().status,
        JobStatus::Stopped
    );

    // Stopping again is an acknowledgment, never an error.
    let again = monitor::stop_stream(&registry, &storage, job.id).await.unwrap();
    assert_eq!(again, JobStatus::Stopped);
}

#[tokio::test]
async fn monitor_synthesizes_manifest_from_observed_segments() {
    let tmp = tempfile::tempdir().unwrap();
    let streamer = helpers::fake_streamer(tmp.path());
    let (registry, storage, runner) = stream_stack(&tmp.path().join("work"), streamer);

    let (job, dir) = seed_stream(&registry, &storage, "rtsp://cam.local/feed").await;
    runner.start(&job, "rtsp://cam.local/feed", &dir).await;

    // Simulate the manifest lagging behind the segments: remove it and wait
    // for the reconciliation loop to rebuild one.
    let manifest_path = dir.join(playlist::MANIFEST_NAME);
    tokio::fs::remove_file(&manifest_path).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    while !manifest_path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "monitor never synthesized a manifest"
        );
        tokio::time::sleep(POLL_STEP).await;
    }

    let manifest = tokio::fs::read_to_string(&manifest_path).await.unwrap();
    assert_eq!(
        playlist::segment_uris(&manifest),
        vec!["seg_000.ts".to_string(), "seg_001.ts".to_string()]
    );

    monitor::stop_stream(&registry, &storage, job.id).await.unwrap();
}

#[tokio::test]
async fn concurrent_streams_use_distinct_scratch_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let streamer = helpers::fake_streamer(tmp.path());
    let (registry, storage, runner) = stream_stack(&tmp.path().join("work"), streamer);

    let (job_a, dir_a) = seed_stream(&registry, &storage, "rtsp://cam.local/a").await;
    let (job_b, dir_b) = seed_stream(&registry, &storage, "rtsp://cam.local/b").await;
    assert_ne!(job_a.id, job_b.id);
    assert_ne!(dir_a, dir_b);

    let (status_a, status_b) = tokio::join!(
        runner.start(&job_a, "rtsp://cam.local/a", &dir_a),
        runner.start(&job_b, "rtsp://cam.local/b", &dir_b),
    );
    assert_eq!(status_a, JobStatus::Streaming);
    assert_eq!(status_b, JobStatus::Streaming);

    // Each job's segments landed in its own directory.
    assert!(dir_a.join("seg_000.ts").exists());
    assert!(dir_b.join("seg_000.ts").exists());

    monitor::stop_stream(&registry, &storage, job_a.id).await.unwrap();
    monitor::stop_stream(&registry, &storage, job_b.id).await.unwrap();
}

#[tokio::test]
async fn stream_launch_failure_marks_the_job_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let (registry, storage, runner) =
        stream_stack(&tmp.path().join("work"), tmp.path().join("no-such-streamer"));

    let (job, dir) = seed_stream(&registry, &storage, "rtsp://cam.local/feed").await;
    let status = runner.start(&job, "rtsp://cam.local/feed", &dir).await;
    assert_eq!(status, JobStatus::Failed);

    let got = registry.get(job.id).await.unwrap();
    assert!(got.error.is_some());
}

#[tokio::test]
async fn stopping_an_unknown_stream_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = JobRegistry::new();
    let storage = JobStorage::new(tmp.path()).unwrap();

    let missing = Uuid::new_v4();
    assert!(matches!(
        monitor::stop_stream(&registry, &storage, missing).await,
        Err(RegistryError::NotFound { id }) if id == missing
    ));
}

#[tokio::test]
async fn sweeper_reclaims_stopped_streams() {
    let tmp = tempfile::tempdir().unwrap();
    let streamer = helpers::fake_streamer(tmp.path());
    let (registry, storage, runner) = stream_stack(&tmp.path().join("work"), streamer);

    let (job, dir) = seed_stream(&registry, &storage, "rtsp://cam.local/feed").await;
    runner.start(&job, "rtsp://cam.local/feed", &dir).await;
    monitor::stop_stream(&registry, &storage, job.id).await.unwrap();

    let sweeper = CleanupSweeper::new(
        registry.clone(),
        storage.clone(),
        Duration::ZERO,
        Duration::from_secs(300),
    );
    let swept = sweeper.sweep_once().await;
    assert_eq!(swept, 1);
    assert!(registry.get(job.id).await.is_err());
    assert!(!dir.exists());
}
