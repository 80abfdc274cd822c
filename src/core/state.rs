//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Run reached a decision without error
    Completed,
    /// Run aborted with an error
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// Pipeline stages, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Preprocess,
    Train,
    Evaluate,
    Promote,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Ingest,
        Stage::Preprocess,
        Stage::Train,
        Stage::Evaluate,
        Stage::Promote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Preprocess => "preprocess",
            Stage::Train => "train",
            Stage::Evaluate => "evaluate",
            Stage::Promote => "promote",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single stage within one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageState {
    /// Stage has not been reached
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        detail: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Stage was not needed for this run (e.g. raw data unchanged)
    Skipped {
        reason: String,
    },
}

impl StageState {
    /// Check if stage is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Completed { .. } | StageState::Failed { .. } | StageState::Skipped { .. }
        )
    }
}

/// State of one orchestrator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Per-stage state, indexed in `Stage::ALL` order
    pub stages: Vec<(Stage, StageState)>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            stages: Stage::ALL.iter().map(|s| (*s, StageState::Pending)).collect(),
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn stage(&self, stage: Stage) -> &StageState {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, state)| state)
            .unwrap_or(&StageState::Pending)
    }

    pub fn set_stage(&mut self, stage: Stage, state: StageState) {
        if let Some(entry) = self.stages.iter_mut().find(|(s, _)| *s == stage) {
            entry.1 = state;
        }
    }

    pub fn mark_running(&mut self, stage: Stage) {
        self.set_stage(stage, StageState::Running { started_at: Utc::now() });
    }

    pub fn mark_completed(&mut self, stage: Stage, detail: String) {
        let started_at = self.started_at_of(stage);
        self.set_stage(
            stage,
            StageState::Completed {
                detail,
                started_at,
                completed_at: Utc::now(),
            },
        );
    }

    pub fn mark_failed(&mut self, stage: Stage, error: String) {
        let started_at = self.started_at_of(stage);
        self.set_stage(
            stage,
            StageState::Failed {
                error,
                started_at,
                failed_at: Utc::now(),
            },
        );
    }

    pub fn mark_skipped(&mut self, stage: Stage, reason: String) {
        self.set_stage(stage, StageState::Skipped { reason });
    }

    fn started_at_of(&self, stage: Stage) -> DateTime<Utc> {
        match self.stage(stage) {
            StageState::Running { started_at } => *started_at,
            _ => Utc::now(),
        }
    }

    /// Number of stages that ran to completion
    pub fn completed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|(_, s)| matches!(s, StageState::Completed { .. }))
            .count()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
