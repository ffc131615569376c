use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::services::registry::JobRegistry;
use crate::services::storage::JobStorage;

/// Periodically deletes terminal jobs older than the retention window,
/// scratch directory included. A job whose process handle still reports
/// running is never touched, whatever its recorded status says.
pub struct CleanupSweeper {
    registry: Arc<JobRegistry>,
    storage: Arc<JobStorage>,
    retention: Duration,
    interval: Duration,
}

impl CleanupSweeper {
    pub fn new(
        registry: Arc<JobRegistry>,
        storage: Arc<JobStorage>,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            retention,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = self.sweep_once().await;
                if swept > 0 {
                    tracing::info!(swept, "cleanup pass removed expired jobs");
                }
            }
        })
    }

    /// One sweep over the registry. Returns the number of jobs removed.
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0usize;

        for job in self.registry.snapshot().await {
            if !job.status.is_terminal() {
                continue;
            }
            let age = now.signed_duration_since(job.created_at);
            if age.num_seconds() < self.retention.as_secs() as i64 {
                continue;
            }
            if self.process_still_running(job.id).await {
                tracing::warn!(job_id = %job.id, "expired job still has a running process, skipping");
                continue;
            }

            let dir = self.storage.job_dir(job.kind, job.id);
            if let Err(err) = self.storage.remove_job_dir(&dir).await {
                tracing::warn!(job_id = %job.id, error = %err, "failed to remove job directory");
                continue;
            }
            self.registry.remove(job.id).await;
            metrics::counter!("transcode_jobs_swept_total").increment(1);
            tracing::debug!(job_id = %job.id, "removed expired job");
            removed += 1;
        }

        metrics::gauge!("transcode_jobs_active").set(self.registry.len().await as f64);
        removed
    }

    async fn process_still_running(&self, id: uuid::Uuid) -> bool {
        let Ok(Some(handle)) = self.registry.process_handle(id).await else {
            return false;
        };
        // A held lock means a waiter is still blocked on the process.
        let Ok(mut guard) = handle.try_lock() else {
            return true;
        };
        match guard.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(Some(_))),
            None => false,
        }
    }
}
