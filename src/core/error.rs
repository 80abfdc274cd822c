//! Error taxonomy for pipeline operations

use crate::core::state::Stage;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by stages, the decision machine and the orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A key whose absence is fatal for the requested operation
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Transient infrastructure failure, retries exhausted
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Model and dataset disagree on the feature columns
    #[error("Schema mismatch: model expects {expected:?}, dataset has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Stage {stage} exceeded its deadline of {secs}s")]
    StageTimeout { stage: Stage, secs: u64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Promotion lease held by {owner} until {expires_at}")]
    LockHeld {
        owner: Uuid,
        expires_at: DateTime<Utc>,
    },

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Attach the failing stage, keeping the innermost stage if already set
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PipelineError::Stage { .. } | PipelineError::StageTimeout { .. } => self,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The taxonomy entry underneath any stage wrapper
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage this error was raised in, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::StageTimeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Whether re-running the same invocation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::StoreUnavailable(_)
                | PipelineError::StageTimeout { .. }
                | PipelineError::LockHeld { .. }
        )
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => PipelineError::StoreUnavailable(msg),
            StoreError::InvalidKey(key) => PipelineError::InvalidKey(key),
        }
    }
}
