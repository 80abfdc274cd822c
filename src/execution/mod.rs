//! Pipeline orchestration: stage sequencing, the retrain decision,
//! promotion and the promotion lease

pub mod decision;
pub mod engine;
pub mod executor;
pub mod lease;
pub mod manifest;
pub mod promotion;

pub use decision::decide;
pub use engine::{
    EventHandler, ExecutionEvent, Refresh, RetrainEngine, RunError, RunMode, RunOutcome,
};
pub use executor::StageExecutor;
pub use lease::{LeaseRecord, PromotionLease};
pub use manifest::ProcessedManifest;
pub use promotion::{ModelPointer, ModelVersion};
