//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::RetrainDecision;
use crate::execution::{RunError, RunMode, RunOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one engine invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    pub mode: RunMode,

    pub status: ExecutionStatus,

    /// Final decision, absent for runs that stopped on an error
    pub decision: Option<RetrainDecision>,

    pub score: Option<f64>,

    pub threshold: Option<f64>,

    pub retrained: bool,

    /// Version promoted by this run
    pub promoted_version: Option<String>,

    pub error: Option<String>,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn from_outcome(pipeline_name: &str, outcome: &RunOutcome) -> Self {
        let report = outcome.report.as_ref();
        Self {
            execution_id: outcome.execution_id,
            pipeline_name: pipeline_name.to_string(),
            mode: outcome.mode,
            status: outcome.state.status,
            decision: report.map(|r| r.decision),
            score: report.and_then(|r| r.score),
            threshold: report.map(|r| r.threshold),
            retrained: outcome.retrained,
            promoted_version: outcome.promoted.as_ref().map(|p| p.version.clone()),
            error: None,
            started_at: outcome.state.started_at.unwrap_or_else(Utc::now),
            completed_at: outcome.state.completed_at,
        }
    }

    pub fn from_error(pipeline_name: &str, error: &RunError) -> Self {
        Self {
            execution_id: error.execution_id,
            pipeline_name: pipeline_name.to_string(),
            mode: error.mode,
            status: error.state.status,
            decision: None,
            score: None,
            threshold: None,
            retrained: false,
            promoted_version: None,
            error: Some(error.to_string()),
            started_at: error.state.started_at.unwrap_or_else(Utc::now),
            completed_at: error.state.completed_at,
        }
    }

    pub fn from_result(pipeline_name: &str, result: &Result<RunOutcome, RunError>) -> Self {
        match result {
            Ok(outcome) => Self::from_outcome(pipeline_name, outcome),
            Err(err) => Self::from_error(pipeline_name, err),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same ID
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// Runs for a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunSummary>>;

    async fn delete_run(&self, execution_id: Uuid) -> Result<()>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(pipeline_name).await?.into_iter().next())
    }

    async fn delete_run(&self, execution_id: Uuid) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.remove(&execution_id);
        Ok(())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
pub(crate) fn sample_run(pipeline_name: &str, started_at: DateTime<Utc>) -> RunSummary {
    RunSummary {
        execution_id: Uuid::new_v4(),
        pipeline_name: pipeline_name.to_string(),
        mode: RunMode::Run,
        status: ExecutionStatus::Completed,
        decision: Some(RetrainDecision::Pass),
        score: Some(0.99),
        threshold: Some(0.99),
        retrained: true,
        promoted_version: Some("20261015T120000Z-0123456789ab".to_string()),
        error: None,
        started_at,
        completed_at: Some(started_at + chrono::Duration::seconds(4)),
    }
}
