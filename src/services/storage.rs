use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::models::job::{JobKind, JobStatus};

/// Small sidecar mirroring the in-memory job status into the job directory.
/// An inspection aid and recovery hint; the registry stays the source of
/// truth.
#[derive(Debug, Serialize)]
pub struct StatusSidecar {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSidecar {
    pub fn for_status(status: JobStatus) -> Self {
        Self {
            status,
            progress: status.progress(),
            pid: None,
            error: None,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Per-job scratch space under a single work root. Stream jobs live in
/// `stream_<id>` directories, transcodes in `<id>`, so no two jobs ever
/// share a directory.
pub struct JobStorage {
    root: PathBuf,
}

pub const SIDECAR_NAME: &str = "status.json";

impl JobStorage {
    /// Create the storage service, ensuring the work root exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic job directory derived from the job id.
    pub fn job_dir(&self, kind: JobKind, id: Uuid) -> PathBuf {
        match kind {
            JobKind::FileTranscode => self.root.join(id.to_string()),
            JobKind::LiveStream => self.root.join(format!("stream_{id}")),
        }
    }

    pub async fn create_job_dir(&self, kind: JobKind, id: Uuid) -> Result<PathBuf, StorageError> {
        let dir = self.job_dir(kind, id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Open the input file for an upload. The caller streams the multipart
    /// body into it and must finish writing before the job is handed to the
    /// launcher.
    pub async fn create_input_file(&self, path: &Path) -> Result<fs::File, StorageError> {
        fs::File::create(path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub async fn write_status(&self, dir: &Path, sidecar: &StatusSidecar) -> Result<(), StorageError> {
        let path = dir.join(SIDECAR_NAME);
        let payload = serde_json::to_vec(sidecar)?;
        fs::write(&path, payload)
            .await
            .map_err(|source| StorageError::Io { path, source })
    }

    pub async fn remove_job_dir(&self, dir: &Path) -> Result<(), StorageError> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    /// Round-trip a probe file through the work root, used by the health
    /// endpoint to detect an unwritable scratch disk.
    pub async fn probe_writable(&self) -> Result<(), StorageError> {
        let path = self.root.join(".healthcheck");
        fs::write(&path, b"ok")
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        fs::remove_file(&path)
            .await
            .map_err(|source| StorageError::Io { path, source })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sidecar serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
