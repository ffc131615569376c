use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{Job, JobInput, JobKind, JobStatus, Quality, SpeedPreset};

/// Shared handle to a job's external process. The monitor task and the stop
/// path serialize on the inner mutex; everyone else only ever `try_lock`s.
pub type SharedChild = Arc<Mutex<Option<Child>>>;

/// Internal registry record: the cloneable job snapshot plus the resources
/// that must never leave the registry.
struct JobRecord {
    job: Job,
    process: Option<SharedChild>,
    cancel: CancellationToken,
}

/// Authoritative in-memory table of jobs, keyed by id and shared across all
/// request handlers and background tasks. Not persisted; jobs are ephemeral
/// and lost on restart.
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new job under a freshly minted id. Callers mint the id
    /// first because the scratch paths are derived from it; the only failure
    /// mode is an id collision, practically impossible with v4 UUIDs. File
    /// transcodes start `queued`; live streams start `initializing` because
    /// the launcher reports readiness provisionally.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: Uuid,
        kind: JobKind,
        input: JobInput,
        output_path: PathBuf,
        output_format: String,
        quality: Quality,
        preset: SpeedPreset,
    ) -> Result<Job, RegistryError> {
        let status = match kind {
            JobKind::FileTranscode => JobStatus::Queued,
            JobKind::LiveStream => JobStatus::Initializing,
        };
        let job = Job {
            id,
            kind,
            status,
            input,
            output_path,
            output_format,
            quality,
            preset,
            error: None,
            created_at: Utc::now(),
        };
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id });
        }
        jobs.insert(
            id,
            JobRecord {
                job: job.clone(),
                process: None,
                cancel: CancellationToken::new(),
            },
        );
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|record| record.job.clone())
            .ok_or(RegistryError::NotFound { id })
    }

    /// Move a job to `status`. Transitions out of a terminal status are
    /// rejected; callers racing against finalization treat that as "lost the
    /// race", not as a failure.
    pub async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if record.job.status.is_terminal() {
            return Err(RegistryError::TerminalState {
                id,
                status: record.job.status,
            });
        }
        record.job.status = status;
        Ok(())
    }

    /// Mark a job failed with a diagnostic message. A no-op if the job is
    /// already terminal, so a stop racing a crash keeps whichever outcome
    /// landed first.
    pub async fn fail(&self, id: Uuid, message: impl Into<String>) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if record.job.status.is_terminal() {
            return Ok(());
        }
        record.job.status = JobStatus::Failed;
        record.job.error = Some(message.into());
        Ok(())
    }

    /// Force a job to `stopped` unless it is already terminal; returns the
    /// status recorded afterwards. This is the idempotent backbone of the
    /// stop operation.
    pub async fn mark_stopped(&self, id: Uuid) -> Result<JobStatus, RegistryError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if !record.job.status.is_terminal() {
            record.job.status = JobStatus::Stopped;
        }
        Ok(record.job.status)
    }

    /// Record the external process handle. At most one process is ever
    /// associated with a job; a second attach is a programming error
    /// surfaced as `ProcessAlreadyAttached`.
    pub async fn attach_process(&self, id: Uuid, child: Child) -> Result<SharedChild, RegistryError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(RegistryError::NotFound { id })?;
        if record.process.is_some() {
            return Err(RegistryError::ProcessAlreadyAttached { id });
        }
        let handle: SharedChild = Arc::new(Mutex::new(Some(child)));
        record.process = Some(handle.clone());
        Ok(handle)
    }

    pub async fn process_handle(&self, id: Uuid) -> Result<Option<SharedChild>, RegistryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|record| record.process.clone())
            .ok_or(RegistryError::NotFound { id })
    }

    pub async fn cancel_token(&self, id: Uuid) -> Result<CancellationToken, RegistryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|record| record.cancel.clone())
            .ok_or(RegistryError::NotFound { id })
    }

    /// Delete an entry. Only the cleanup sweeper calls this, and only for
    /// terminal, expired jobs.
    pub async fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().await.remove(&id).map(|record| record.job)
    }

    pub async fn snapshot(&self) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .values()
            .map(|record| record.job.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("job id {id} already registered")]
    DuplicateId { id: Uuid },

    #[error("job {id} is already terminal ({status})")]
    TerminalState { id: Uuid, status: JobStatus },

    #[error("job {id} already has a process attached")]
    ProcessAlreadyAttached { id: Uuid },
}
