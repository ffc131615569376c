use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::models::job::{Job, JobInput, JobStatus};
use crate::services::encoder::{self, Encoders, LaunchError};
use crate::services::monitor::{spawn_stderr_drain, StderrTail};
use crate::services::registry::JobRegistry;
use crate::services::storage::{JobStorage, StatusSidecar};

/// Launches the external encoder for uploaded files and finalizes the job
/// from a background waiter. The HTTP response never waits on encoding.
pub struct TranscodeRunner {
    registry: Arc<JobRegistry>,
    storage: Arc<JobStorage>,
    encoders: Arc<Encoders>,
}

impl TranscodeRunner {
    pub fn new(registry: Arc<JobRegistry>, storage: Arc<JobStorage>, encoders: Arc<Encoders>) -> Self {
        Self {
            registry,
            storage,
            encoders,
        }
    }

    /// Spawn the encoder for a freshly uploaded job. A spawn failure fails
    /// the job immediately rather than leaving it queued forever.
    pub async fn start(&self, job: &Job) {
        let dir = self.storage.job_dir(job.kind, job.id);

        match self.spawn(job).await {
            Ok(()) => {
                let _ = self
                    .storage
                    .write_status(&dir, &StatusSidecar::for_status(JobStatus::Processing))
                    .await;
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "failed to launch encoder");
                let message = err.to_string();
                let _ = self.registry.fail(job.id, message.clone()).await;
                let sidecar = StatusSidecar::for_status(JobStatus::Failed).with_error(message);
                let _ = self.storage.write_status(&dir, &sidecar).await;
                metrics::counter!("transcode_jobs_failed_total").increment(1);
            }
        }
    }

    async fn spawn(&self, job: &Job) -> Result<(), LaunchError> {
        let binary = self.encoders.ffmpeg()?;
        let JobInput::UploadedFile(input_path) = &job.input else {
            return Err(LaunchError::InvalidInput("job has no uploaded input file"));
        };

        let args = encoder::transcode_args(input_path, &job.output_path, job.quality, job.preset);
        tracing::info!(
            job_id = %job.id,
            command = %format!("{} {}", binary.display(), args.join(" ")),
            "starting transcode"
        );

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: binary.to_path_buf(),
                source,
            })?;

        let tail = StderrTail::new();
        let drain = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_drain(stderr, tail.clone(), job.id));

        let handle = self
            .registry
            .attach_process(job.id, child)
            .await
            .map_err(|err| LaunchError::Attach(err.to_string()))?;
        let _ = self.registry.update_status(job.id, JobStatus::Processing).await;

        let registry = self.registry.clone();
        let storage = self.storage.clone();
        let job_id = job.id;
        let dir = self.storage.job_dir(job.kind, job.id);
        tokio::spawn(async move {
            // The waiter takes ownership of the child; the job only turns
            // terminal after the wait resolves, so the sweeper never sees a
            // terminal job with this process still running.
            let child = { handle.lock().await.take() };
            let Some(mut child) = child else { return };
            let status = child.wait().await;

            // The pipe closes with the process; wait for the drain to catch
            // the last diagnostic lines before reading the tail.
            if let Some(drain) = drain {
                let _ = drain.await;
            }

            match status {
                Ok(status) if status.success() => {
                    tracing::info!(job_id = %job_id, "transcode completed");
                    if registry.update_status(job_id, JobStatus::Completed).await.is_ok() {
                        let _ = storage
                            .write_status(&dir, &StatusSidecar::for_status(JobStatus::Completed))
                            .await;
                        metrics::counter!("transcode_jobs_completed_total").increment(1);
                    }
                }
                Ok(status) => {
                    let message = format!(
                        "encoder exited with code {}: {}",
                        status
                            .code()
                            .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                        tail.joined()
                    );
                    tracing::error!(job_id = %job_id, code = ?status.code(), "transcode failed");
                    if registry.fail(job_id, message.clone()).await.is_ok() {
                        let sidecar = StatusSidecar::for_status(JobStatus::Failed).with_error(message);
                        let _ = storage.write_status(&dir, &sidecar).await;
                        metrics::counter!("transcode_jobs_failed_total").increment(1);
                    }
                }
                Err(err) => {
                    let message = format!("failed waiting on encoder: {err}");
                    if registry.fail(job_id, message.clone()).await.is_ok() {
                        let sidecar = StatusSidecar::for_status(JobStatus::Failed).with_error(message);
                        let _ = storage.write_status(&dir, &sidecar).await;
                        metrics::counter!("transcode_jobs_failed_total").increment(1);
                    }
                }
            }
        });

        Ok(())
    }
}
