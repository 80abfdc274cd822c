//! Local staging of artifacts
//!
//! A [`StagingArea`] is a private temporary directory owned by one stage
//! invocation. Its name is random, so concurrent invocations never collide,
//! and it is removed when dropped, on success and failure alike.

use crate::core::PipelineError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a staging area under the system temp directory
    pub fn new() -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix("retrain-staging-")
            .tempdir()
            .map_err(|e| PipelineError::Internal(format!("failed to create staging dir: {}", e)))?;
        debug!("Created staging area {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a staging area under a specific parent directory
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix("retrain-staging-")
            .tempdir_in(parent)
            .map_err(|e| PipelineError::Internal(format!("failed to create staging dir: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh, unused file path inside the area, keeping the key's file name
    pub fn file_for(&self, key: &str) -> PathBuf {
        let name = key.rsplit('/').next().unwrap_or(key);
        self.dir
            .path()
            .join(format!("{}-{}", Uuid::new_v4().simple(), name))
    }

    /// Write bytes for `key` into the area
    pub async fn stage_bytes(&self, key: &str, bytes: &[u8]) -> Result<StagedArtifact, PipelineError> {
        let path = self.file_for(key);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            PipelineError::Internal(format!("failed to stage {}: {}", key, e))
        })?;
        Ok(StagedArtifact {
            key: key.to_string(),
            path,
            size: bytes.len() as u64,
        })
    }
}

/// A blob materialized on local disk for the duration of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Logical store key the file was fetched from (or will be stored at)
    pub key: String,

    /// Local path inside a staging area
    pub path: PathBuf,

    pub size: u64,
}

impl StagedArtifact {
    pub async fn read(&self) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            PipelineError::Internal(format!("failed to read staged {}: {}", self.key, e))
        })
    }

    /// Delete the local copy once it has been consumed
    pub async fn remove(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!("Staged file {} already gone: {}", self.path.display(), e);
        }
    }
}
