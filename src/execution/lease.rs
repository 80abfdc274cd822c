//! Promotion lease - a time-bounded lock record in the object store

use crate::core::PipelineError;
use crate::store::ArtifactClient;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Contents of the lease key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub owner: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A held promotion lease
///
/// Only one training/promotion run holds the lease at a time. It must be
/// given back with [`PromotionLease::release`]; an abandoned lease becomes
/// breakable once it expires. Every removal of the lease key is conditional
/// on the exact record being removed, so breaking a stale lease can never
/// remove a lease another run has just taken.
pub struct PromotionLease {
    client: ArtifactClient,
    key: String,
    record: LeaseRecord,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for PromotionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionLease")
            .field("key", &self.key)
            .field("record", &self.record)
            .finish()
    }
}

const ACQUIRE_ATTEMPTS: usize = 3;

impl PromotionLease {
    pub async fn acquire(
        client: &ArtifactClient,
        key: &str,
        owner: Uuid,
        ttl: std::time::Duration,
    ) -> Result<Self, PipelineError> {
        let ttl = Duration::from_std(ttl)
            .map_err(|e| PipelineError::Config(format!("invalid lease ttl: {}", e)))?;
        let mut last_seen: Option<LeaseRecord> = None;

        for _ in 0..ACQUIRE_ATTEMPTS {
            let now = Utc::now();
            let record = LeaseRecord {
                owner,
                acquired_at: now,
                expires_at: now + ttl,
            };
            let bytes = serde_json::to_vec(&record)
                .map_err(|e| PipelineError::Internal(format!("failed to serialize lease: {}", e)))?;

            if client.put_if_absent(key, bytes.clone()).await? {
                let lease = Self {
                    client: client.clone(),
                    key: key.to_string(),
                    record,
                    bytes,
                };
                lease.verify().await?;
                info!("Acquired lease {} until {}", key, lease.record.expires_at);
                return Ok(lease);
            }

            let Some(existing) = client.fetch_bytes(key).await? else {
                debug!("Lease {} released while acquiring; retrying", key);
                continue;
            };

            match serde_json::from_slice::<LeaseRecord>(&existing) {
                // A retried create that actually landed the first time
                Ok(held) if held.owner == owner => {
                    let lease = Self {
                        client: client.clone(),
                        key: key.to_string(),
                        record: held,
                        bytes: existing,
                    };
                    lease.verify().await?;
                    return Ok(lease);
                }
                Ok(held) if !held.is_expired(now) => {
                    return Err(PipelineError::LockHeld {
                        owner: held.owner,
                        expires_at: held.expires_at,
                    });
                }
                Ok(held) => {
                    warn!(
                        "Breaking lease {} held by {} (expired {})",
                        key, held.owner, held.expires_at
                    );
                    last_seen = Some(held);
                }
                Err(e) => {
                    warn!("Breaking unreadable lease {}: {}", key, e);
                }
            }

            if !client.delete_if_matches(key, &existing).await? {
                debug!("Lease {} changed while breaking it; retrying", key);
            }
        }

        match last_seen {
            Some(held) => Err(PipelineError::LockHeld {
                owner: held.owner,
                expires_at: held.expires_at,
            }),
            None => Err(PipelineError::Internal(format!(
                "could not acquire lease {} after {} attempts",
                key, ACQUIRE_ATTEMPTS
            ))),
        }
    }

    pub fn owner(&self) -> Uuid {
        self.record.owner
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.record.expires_at
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Confirm the store still holds this lease and it has not expired
    ///
    /// Fails with `LockHeld` naming whoever holds the key now.
    pub async fn verify(&self) -> Result<(), PipelineError> {
        let current = self.client.fetch_bytes(&self.key).await?;
        if current.as_deref() == Some(self.bytes.as_slice()) {
            if self.record.is_expired(Utc::now()) {
                warn!("Lease {} expired while held", self.key);
                return Err(PipelineError::LockHeld {
                    owner: self.record.owner,
                    expires_at: self.record.expires_at,
                });
            }
            return Ok(());
        }

        warn!("Lease {} is no longer held by {}", self.key, self.record.owner);
        let holder = current
            .and_then(|bytes| serde_json::from_slice::<LeaseRecord>(&bytes).ok())
            .unwrap_or_else(|| self.record.clone());
        Err(PipelineError::LockHeld {
            owner: holder.owner,
            expires_at: holder.expires_at,
        })
    }

    /// Give the lease back
    ///
    /// A lease that was broken and re-acquired by another run is left alone.
    pub async fn release(self) -> Result<(), PipelineError> {
        if self.client.delete_if_matches(&self.key, &self.bytes).await? {
            info!("Released lease {}", self.key);
        } else {
            warn!("Lease {} is no longer ours; not releasing", self.key);
        }
        Ok(())
    }
}
