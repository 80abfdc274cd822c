//! Processed-data manifest
//!
//! Written next to the processed blob so a later run can tell whether the
//! raw data changed since it was last ingested.

use crate::core::{ArtifactKeys, PipelineError};
use crate::stages::Shuffle;
use crate::store::ArtifactClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedManifest {
    pub raw_key: String,
    pub raw_sha256: String,
    pub processed_sha256: String,
    pub shuffle: Shuffle,
    pub rows: usize,
    pub columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub execution_id: Uuid,
}

impl ProcessedManifest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| PipelineError::Internal(format!("failed to serialize manifest: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidData(format!("corrupt manifest: {}", e)))
    }

    /// Load the manifest; an unreadable one counts as absent
    pub async fn load(
        client: &ArtifactClient,
        keys: &ArtifactKeys,
    ) -> Result<Option<Self>, PipelineError> {
        let key = keys.manifest();
        let Some(bytes) = client.fetch_bytes(&key).await? else {
            return Ok(None);
        };
        match Self::from_bytes(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("Ignoring {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, client: &ArtifactClient, keys: &ArtifactKeys) -> Result<(), PipelineError> {
        client.put_bytes(&keys.manifest(), self.to_bytes()?).await
    }
}
