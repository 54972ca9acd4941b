//! Transient storage for uploaded documents awaiting processing.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StorageError;

/// Directory-backed store. Files are named `{job_id}.{ext}`, so concurrent
/// uploads with the same original filename never collide.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Create the store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::Directory {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a job's document is stored under.
    pub fn path_for(&self, job_id: Uuid, extension: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.{extension}"))
    }

    /// Persist the uploaded bytes and return the stored path.
    pub async fn save(
        &self,
        job_id: Uuid,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.path_for(job_id, extension);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Write {
                path: path.clone(),
                source: e,
            })?;
        debug!(job_id = %job_id, path = %path.display(), bytes = bytes.len(), "Saved upload");
        Ok(path)
    }

    /// Delete a stored document. Already-missing files are not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// `remove` for cleanup paths that cannot propagate: failures are logged.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = self.remove(path).await {
            warn!(error = %e, "Failed to clean up upload");
        }
    }
}
