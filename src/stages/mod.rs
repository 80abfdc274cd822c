//! Stage functions
//!
//! Each stage turns staged input files into a staged output (or a value)
//! and touches nothing else. Fetching inputs and publishing outputs is the
//! orchestrator's job, which keeps every stage independently invocable.

pub mod evaluate;
pub mod ingest;
pub mod preprocess;
pub mod train;

pub use evaluate::{accuracy, evaluate};
pub use ingest::ingest;
pub use preprocess::{preprocess, preprocess_file, Shuffle};
pub use train::{train, TrainOutput};

use crate::core::PipelineError;

/// Run CPU-bound work off the async runtime
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::Internal(format!("stage task aborted: {}", e)))?
}
