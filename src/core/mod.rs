//! Core domain models for the retrain pipeline
//!
//! This module defines configuration, artifact keys, tabular data, the
//! decision values and the error taxonomy shared by every stage.

pub mod config;
pub mod dataset;
pub mod decision;
pub mod error;
pub mod keys;
pub mod state;

pub use config::PipelineConfig;
pub use dataset::{Dataset, Table};
pub use decision::{gate, DecisionReport, RetrainDecision};
pub use error::PipelineError;
pub use keys::ArtifactKeys;
pub use state::*;
