//! retrain - accuracy-gated retraining for a tabular classifier

pub mod cli;
pub mod core;
pub mod execution;
pub mod model;
pub mod persistence;
pub mod stages;
pub mod store;
pub mod trigger;

// Re-export commonly used types
pub use core::{DecisionReport, ExecutionStatus, PipelineConfig, PipelineError, RetrainDecision, Stage};
pub use execution::{ExecutionEvent, RetrainEngine, RunError, RunMode, RunOutcome};
pub use store::{ArtifactClient, FsStore, InMemoryStore, ObjectStore};
pub use trigger::{OutcomeClass, TriggerResponse};
