//! Stage executor - runs one stage under its deadline

use crate::core::config::TimeoutConfig;
use crate::core::{PipelineError, Stage};
use std::collections::HashMap;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{debug, error};

/// Applies per-stage deadlines and tags failures with their stage
#[derive(Debug, Clone)]
pub struct StageExecutor {
    deadlines: HashMap<Stage, Duration>,
}

impl StageExecutor {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let deadlines = Stage::ALL
            .iter()
            .map(|&stage| (stage, Duration::from_secs(timeouts.for_stage(stage))))
            .collect();
        Self { deadlines }
    }

    /// Override one stage's deadline
    pub fn with_deadline(mut self, stage: Stage, deadline: Duration) -> Self {
        self.deadlines.insert(stage, deadline);
        self
    }

    pub fn deadline(&self, stage: Stage) -> Duration {
        self.deadlines
            .get(&stage)
            .copied()
            .unwrap_or(Duration::from_secs(300))
    }

    /// Execute a stage body
    ///
    /// Expiry drops the body future, which cancels any in-flight store call
    /// and removes the body's staging files.
    pub async fn run<T, Fut>(&self, stage: Stage, body: Fut) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let deadline = self.deadline(stage);
        debug!("Running stage {} (deadline {:?})", stage, deadline);

        match timeout(deadline, body).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.in_stage(stage)),
            Err(_) => {
                error!("Stage {} exceeded its deadline of {:?}", stage, deadline);
                Err(PipelineError::StageTimeout {
                    stage,
                    secs: deadline.as_secs(),
                })
            }
        }
    }
}

impl Default for StageExecutor {
    fn default() -> Self {
        Self::new(&TimeoutConfig::default())
    }
}
