//! Artifact client - retries and staging on top of an object store

use crate::core::config::RetryConfig;
use crate::core::PipelineError;
use crate::store::{ObjectStore, StagedArtifact, StagingArea, StoreError};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store access used by every stage
///
/// Transient failures (`StoreError::Unavailable`) are retried with
/// exponential backoff up to `RetryConfig::max_attempts` total attempts.
#[derive(Clone)]
pub struct ArtifactClient {
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
}

impl ArtifactClient {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, key: &str, mut call: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(StoreError::Unavailable(msg)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Store {} of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        op, key, attempt, self.retry.max_attempts, msg, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Whether `key` holds a blob; absence is `false`, not an error
    pub async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        self.with_retry("exists", key, || self.store.exists(key)).await
    }

    /// Read a blob into memory
    pub async fn fetch_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.with_retry("fetch", key, || self.store.get(key)).await
    }

    /// Materialize a blob into `staging`; `None` when the key is absent
    pub async fn fetch(
        &self,
        key: &str,
        staging: &StagingArea,
    ) -> Result<Option<StagedArtifact>, PipelineError> {
        match self.fetch_bytes(key).await? {
            Some(bytes) => {
                let staged = staging.stage_bytes(key, &bytes).await?;
                debug!("Fetched {} to {}", key, staged.path.display());
                Ok(Some(staged))
            }
            None => Ok(None),
        }
    }

    /// Upload a local file to `key`
    pub async fn put(&self, key: &str, local_path: &Path) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            PipelineError::Internal(format!("failed to read {}: {}", local_path.display(), e))
        })?;
        self.put_bytes(key, bytes).await
    }

    pub async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        let size = bytes.len();
        self.with_retry("put", key, || self.store.put(key, bytes.clone()))
            .await?;
        info!("Uploaded {} ({} bytes)", key, size);
        Ok(())
    }

    pub async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, PipelineError> {
        self.with_retry("create", key, || self.store.put_if_absent(key, bytes.clone()))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, PipelineError> {
        self.with_retry("delete", key, || self.store.delete(key)).await
    }

    /// Delete `key` only while it holds `expected`
    ///
    /// A retry after a lost response reports `false` even though the first
    /// attempt removed the blob.
    pub async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, PipelineError> {
        self.with_retry("conditional delete", key, || {
            self.store.delete_if_matches(key, expected)
        })
        .await
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        self.with_retry("list", prefix, || self.store.list(prefix)).await
    }
}
