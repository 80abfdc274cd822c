//! Artifact store: key-addressed blobs with local staging
//!
//! Backends implement the small [`ObjectStore`] trait. Stages never talk to a
//! backend directly; they go through [`ArtifactClient`], which adds retries
//! and materializes blobs into a private [`StagingArea`].

pub mod client;
pub mod fs;
pub mod memory;
pub mod staging;

pub use client::ArtifactClient;
pub use fs::FsStore;
pub use memory::InMemoryStore;
pub use staging::{StagedArtifact, StagingArea};

use crate::core::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by store backends
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Transport, permission or I/O failure; the call may be retried
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    InvalidKey(String),
}

/// Trait for object store backends
///
/// Absence is never an error: `get` returns `None` and `exists` returns
/// `false`. Writes are atomic per key: readers observe either the previous
/// blob or the complete new one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether a key holds a blob
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Read a whole blob
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the blob at `key`
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Create the blob only if `key` is absent; returns whether it was created
    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError>;

    /// Remove a blob; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove the blob only while it still holds exactly `expected`
    ///
    /// Returns `false`, leaving the key alone, when the key is absent or holds
    /// anything else.
    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// List keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Build the backend named in configuration
pub fn open(config: &StoreConfig) -> Arc<dyn ObjectStore> {
    match config.backend {
        StoreBackend::Fs => Arc::new(FsStore::new(config.root.clone())),
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
    }
}

/// Check that a key is a relative, `/`-separated path without `.` or `..`
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".to_string()));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(StoreError::InvalidKey(format!(
            "key '{}' must not start or end with '/'",
            key
        )));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(StoreError::InvalidKey(format!(
            "key '{}' contains a forbidden character",
            key
        )));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::InvalidKey(format!(
                "key '{}' has an invalid path segment",
                key
            )));
        }
    }
    Ok(())
}
