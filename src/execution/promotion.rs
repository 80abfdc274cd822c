//! Model promotion, version listing and rollback
//!
//! Promotion never overwrites history. The model bytes first land under an
//! immutable version key, then the canonical key receives a full copy, and
//! finally the pointer record names the version the canonical key now holds.
//! A reader of the canonical key therefore always sees a complete model,
//! either the previous one or the new one.
//!
//! When the pointer write fails the previous canonical bytes are put back. A
//! promotion cut off between the two writes can still leave them apart, so
//! readers only trust a pointer whose digest matches the canonical bytes.

use crate::core::{ArtifactKeys, PipelineError};
use crate::store::ArtifactClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Record stored next to the canonical model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPointer {
    pub version: String,
    pub version_key: String,
    pub sha256: String,
    pub promoted_at: DateTime<Utc>,
    pub execution_id: Uuid,
}

impl ModelPointer {
    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| PipelineError::Internal(format!("failed to serialize pointer: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidData(format!("corrupt model pointer: {}", e)))
    }

    /// Whether this pointer names exactly `model_bytes`
    pub fn describes(&self, model_bytes: &[u8]) -> bool {
        self.sha256 == sha256_hex(model_bytes)
    }
}

/// One stored model version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub key: String,
    /// Whether the pointer currently names this version
    pub current: bool,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// `<yyyymmddThhmmssZ>-<first 12 hex digits of the content digest>`
///
/// Ids sort chronologically, and identical bytes promoted in the same second
/// map to the same id.
pub fn version_id(digest: &str, at: DateTime<Utc>) -> String {
    let short = &digest[..digest.len().min(12)];
    format!("{}-{}", at.format("%Y%m%dT%H%M%SZ"), short)
}

/// Publish `model_bytes` as the new canonical model
pub async fn promote(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
    model_bytes: Vec<u8>,
    execution_id: Uuid,
) -> Result<ModelPointer, PipelineError> {
    let digest = sha256_hex(&model_bytes);
    let now = Utc::now();
    let version = version_id(&digest, now);
    let version_key = keys.version(&version);

    client.put_bytes(&version_key, model_bytes.clone()).await?;

    let pointer = ModelPointer {
        version,
        version_key,
        sha256: digest,
        promoted_at: now,
        execution_id,
    };
    publish(client, keys, model_bytes, &pointer).await?;

    info!("Promoted model version {} to {}", pointer.version, keys.model);
    Ok(pointer)
}

/// Copy `model_bytes` to the canonical key, then write `pointer`
async fn publish(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
    model_bytes: Vec<u8>,
    pointer: &ModelPointer,
) -> Result<(), PipelineError> {
    let pointer_bytes = pointer.to_bytes()?;
    let previous = client.fetch_bytes(&keys.model).await?;
    client.put_bytes(&keys.model, model_bytes).await?;

    if let Err(e) = client.put_bytes(&keys.pointer(), pointer_bytes).await {
        warn!("Pointer write for {} failed; restoring previous model", keys.model);
        let restored = match previous {
            Some(bytes) => client.put_bytes(&keys.model, bytes).await,
            None => client.delete(&keys.model).await.map(|_| ()),
        };
        if let Err(restore_err) = restored {
            error!("Failed to restore {}: {}", keys.model, restore_err);
        }
        return Err(e);
    }
    Ok(())
}

/// The pointer record as stored, whether or not it matches the canonical model
pub async fn current_pointer(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
) -> Result<Option<ModelPointer>, PipelineError> {
    match client.fetch_bytes(&keys.pointer()).await? {
        Some(bytes) => ModelPointer::from_bytes(&bytes).map(Some),
        None => Ok(None),
    }
}

/// The pointer, only if it names the bytes at the canonical key
///
/// An unreadable or stale pointer is reported as no pointer.
pub async fn verified_pointer(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
) -> Result<Option<ModelPointer>, PipelineError> {
    match client.fetch_bytes(&keys.model).await? {
        Some(model_bytes) => pointer_for(client, keys, &model_bytes).await,
        None => Ok(None),
    }
}

/// The pointer, only if it names `model_bytes`
pub async fn pointer_for(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
    model_bytes: &[u8],
) -> Result<Option<ModelPointer>, PipelineError> {
    let pointer = match current_pointer(client, keys).await {
        Ok(pointer) => pointer,
        Err(e) if e.is_retryable() => return Err(e),
        Err(e) => {
            warn!("Ignoring unreadable pointer {}: {}", keys.pointer(), e);
            None
        }
    };
    Ok(pointer.filter(|p| {
        let matches = p.describes(model_bytes);
        if !matches {
            warn!(
                "Pointer {} names {} but {} holds other bytes; ignoring it",
                keys.pointer(),
                p.version,
                keys.model
            );
        }
        matches
    }))
}

/// All stored versions, oldest first
pub async fn list_versions(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
) -> Result<Vec<ModelVersion>, PipelineError> {
    let current = verified_pointer(client, keys).await?.map(|p| p.version);

    let mut versions: Vec<ModelVersion> = client
        .list(&keys.versions_prefix())
        .await?
        .into_iter()
        .filter_map(|key| {
            let version = keys.version_id_of(&key)?;
            Some(ModelVersion {
                current: current.as_deref() == Some(version.as_str()),
                version,
                key,
            })
        })
        .collect();
    versions.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(versions)
}

/// Re-point the canonical model at a stored version
pub async fn rollback(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
    version: &str,
    execution_id: Uuid,
) -> Result<ModelPointer, PipelineError> {
    let version_key = keys.version(version);
    if keys.version_id_of(&version_key).as_deref() != Some(version) {
        return Err(PipelineError::InvalidKey(format!(
            "'{}' is not a model version id",
            version
        )));
    }

    let bytes = client
        .fetch_bytes(&version_key)
        .await?
        .ok_or_else(|| PipelineError::NotFound(version_key.clone()))?;

    let pointer = ModelPointer {
        version: version.to_string(),
        version_key,
        sha256: sha256_hex(&bytes),
        promoted_at: Utc::now(),
        execution_id,
    };
    publish(client, keys, bytes, &pointer).await?;

    info!("Rolled {} back to version {}", keys.model, version);
    Ok(pointer)
}
