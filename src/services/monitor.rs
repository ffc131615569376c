use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::JobStatus;
use crate::services::playlist;
use crate::services::registry::{JobRegistry, RegistryError, SharedChild};
use crate::services::storage::{JobStorage, StatusSidecar};

/// Fixed reconciliation cadence for running streams.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// How long a stopping process gets to exit on its own before the force
/// kill.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Number of diagnostic lines retained for failure reports.
const TAIL_LINES: usize = 20;

/// Rolling tail of an external process's stderr. The drain task appends,
/// finalization reads; the bound keeps an endlessly chatty encoder from
/// growing memory.
#[derive(Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES))),
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().expect("stderr tail poisoned");
        if lines.len() == TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn joined(&self) -> String {
        let lines = self.lines.lock().expect("stderr tail poisoned");
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl Default for StderrTail {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuously read a process's stderr so its pipe buffer never fills and
/// blocks the encoder. Lines containing encoder errors are logged as they
/// appear.
pub fn spawn_stderr_drain(stderr: ChildStderr, tail: StderrTail, job_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains("Error") || line.contains("error") {
                tracing::warn!(job_id = %job_id, line = %line, "encoder diagnostic");
            }
            tail.push(line);
        }
    })
}

/// Per-stream background monitor: reconciles on-disk segment/manifest state
/// with the job status on a fixed interval and finalizes the job when the
/// external process exits. Never leaves a job silently stuck: any monitor
/// failure marks the job failed with the error message.
#[allow(clippy::too_many_arguments)]
pub async fn run_stream_monitor(
    registry: Arc<JobRegistry>,
    storage: Arc<JobStorage>,
    job_id: Uuid,
    dir: std::path::PathBuf,
    handle: SharedChild,
    cancel: CancellationToken,
    tail: StderrTail,
    mut drain: Option<JoinHandle<()>>,
) {
    let outcome = monitor_loop(
        &registry, &storage, job_id, &dir, &handle, &cancel, &tail, &mut drain,
    )
    .await;
    if let Err(message) = outcome {
        tracing::error!(job_id = %job_id, error = %message, "stream monitor failed");

        // The process must not outlive its monitor.
        {
            let mut guard = handle.lock().await;
            if let Some(mut child) = guard.take() {
                if !matches!(child.try_wait(), Ok(Some(_))) {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        let _ = registry.fail(job_id, message.clone()).await;
        let failed = registry
            .get(job_id)
            .await
            .map(|job| job.status == JobStatus::Failed)
            .unwrap_or(false);
        if failed {
            let sidecar = StatusSidecar::for_status(JobStatus::Failed).with_error(message);
            if let Err(err) = storage.write_status(&dir, &sidecar).await {
                tracing::warn!(job_id = %job_id, error = %err, "failed to write status sidecar");
            }
            metrics::counter!("transcode_jobs_failed_total").increment(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn monitor_loop(
    registry: &JobRegistry,
    storage: &JobStorage,
    job_id: Uuid,
    dir: &Path,
    handle: &SharedChild,
    cancel: &CancellationToken,
    tail: &StderrTail,
    drain: &mut Option<JoinHandle<()>>,
) -> Result<(), String> {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // The stop operation owns finalization on this path.
                tracing::debug!(job_id = %job_id, "stream monitor cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let exit = {
            let mut guard = handle.lock().await;
            let poll = match guard.as_mut() {
                Some(child) => child.try_wait(),
                // Process already reaped elsewhere (stop path); nothing left
                // to watch.
                None => return Ok(()),
            };
            match poll {
                Ok(Some(status)) => {
                    guard.take();
                    Some(status)
                }
                Ok(None) => None,
                Err(err) => return Err(format!("failed to poll encoder process: {err}")),
            }
        };

        if let Some(status) = exit {
            // Let the stderr drain catch the final lines before reading the
            // tail for the failure report.
            if let Some(drain) = drain.take() {
                let _ = drain.await;
            }
            finalize(registry, storage, job_id, dir, status, tail).await;
            return Ok(());
        }

        reconcile(registry, storage, job_id, dir)
            .await
            .map_err(|err| format!("reconciliation failed: {err}"))?;

        if registry
            .get(job_id)
            .await
            .map(|job| job.status.is_terminal())
            .unwrap_or(true)
        {
            return Ok(());
        }
    }
}

/// Bring job status in line with what the encoder has written to disk:
/// promote to `streaming` once the first segment lands, and synthesize a
/// manifest when segments exist before the encoder has flushed its own.
async fn reconcile(
    registry: &JobRegistry,
    storage: &JobStorage,
    job_id: Uuid,
    dir: &Path,
) -> std::io::Result<()> {
    let segments = playlist::list_segments(dir).await?;
    if segments.is_empty() {
        return Ok(());
    }

    let manifest_path = dir.join(playlist::MANIFEST_NAME);
    if !manifest_path.exists() {
        tokio::fs::write(&manifest_path, playlist::synthesize(&segments)).await?;
        tracing::info!(job_id = %job_id, segments = segments.len(), "synthesized interim manifest");
    }

    if let Ok(job) = registry.get(job_id).await {
        if matches!(job.status, JobStatus::Initializing | JobStatus::Starting) {
            if registry.update_status(job_id, JobStatus::Streaming).await.is_ok() {
                tracing::info!(job_id = %job_id, "stream is live");
                let _ = storage
                    .write_status(dir, &StatusSidecar::for_status(JobStatus::Streaming))
                    .await;
            }
        }
    }
    Ok(())
}

async fn finalize(
    registry: &JobRegistry,
    storage: &JobStorage,
    job_id: Uuid,
    dir: &Path,
    status: std::process::ExitStatus,
    tail: &StderrTail,
) {
    if status.success() {
        tracing::info!(job_id = %job_id, "stream process exited cleanly");
        // Transition may lose to a concurrent stop; keep whichever landed.
        if registry.update_status(job_id, JobStatus::Completed).await.is_ok() {
            let _ = storage
                .write_status(dir, &StatusSidecar::for_status(JobStatus::Completed))
                .await;
            metrics::counter!("transcode_jobs_completed_total").increment(1);
        }
    } else {
        let code = status.code();
        let message = format!(
            "stream process exited with code {}: {}",
            code.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
            tail.joined()
        );
        tracing::error!(job_id = %job_id, code = ?code, "stream process failed");
        if registry.fail(job_id, message.clone()).await.is_ok() {
            let sidecar = StatusSidecar::for_status(JobStatus::Failed).with_error(message);
            let _ = storage.write_status(dir, &sidecar).await;
            metrics::counter!("transcode_jobs_failed_total").increment(1);
        }
    }
}

/// Stop a stream job: interrupt its monitor, ask the encoder to quit, force
/// kill after a bounded grace period, and record `stopped`. Idempotent —
/// stopping an already-terminal job acknowledges without touching the
/// recorded outcome, and kill failures are reported informationally, never
/// to the caller.
pub async fn stop_stream(
    registry: &JobRegistry,
    storage: &JobStorage,
    job_id: Uuid,
) -> Result<JobStatus, RegistryError> {
    let job = registry.get(job_id).await?;

    if let Ok(token) = registry.cancel_token(job_id).await {
        token.cancel();
    }

    if let Ok(Some(handle)) = registry.process_handle(job_id).await {
        let mut guard = handle.lock().await;
        if let Some(mut child) = guard.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // FFmpeg quits cleanly on `q`; gst-launch ignores it and
                    // takes the kill path below.
                    if let Some(stdin) = child.stdin.as_mut() {
                        let _ = stdin.write_all(b"q").await;
                        let _ = stdin.flush().await;
                    }
                    let exited = tokio::time::timeout(STOP_GRACE, child.wait()).await;
                    if exited.is_err() {
                        if let Err(err) = child.start_kill() {
                            tracing::warn!(job_id = %job_id, error = %err, "force kill failed");
                        }
                        let _ = child.wait().await;
                    }
                }
                Err(err) => {
                    tracing::warn!(job_id = %job_id, error = %err, "could not poll process during stop");
                }
            }
        }
    }

    let recorded = registry.mark_stopped(job_id).await?;
    if recorded == JobStatus::Stopped {
        let dir = storage.job_dir(job.kind, job_id);
        if let Err(err) = storage
            .write_status(&dir, &StatusSidecar::for_status(JobStatus::Stopped))
            .await
        {
            tracing::warn!(job_id = %job_id, error = %err, "failed to write status sidecar");
        }
    }
    tracing::info!(job_id = %job_id, recorded = %recorded, "stream stop acknowledged");
    Ok(recorded)
}
