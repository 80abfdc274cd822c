//! Trigger adapter: maps run results to exit codes, HTTP statuses and a
//! JSON response body
//!
//! | outcome | exit code | HTTP |
//! |---|---|---|
//! | PASS, or nothing to decide | 0 | 200 |
//! | FAIL, NO_MODEL | 1 | 409 |
//! | NO_DATA | 1 | 424 |
//! | lease held | 75 | 423 |
//! | store unavailable | 3 | 503 |
//! | stage timeout | 3 | 504 |
//! | any other error | 2 | 500 |

#[cfg(feature = "server")]
pub mod server;

use crate::core::{PipelineError, RetrainDecision};
use crate::execution::{RunError, RunOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse classification of a run result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    /// FAIL or NO_MODEL
    NotPassing,
    NoData,
    LockHeld,
    StoreUnavailable,
    Timeout,
    Error,
}

impl OutcomeClass {
    pub fn of(result: &Result<RunOutcome, RunError>) -> Self {
        match result {
            Ok(outcome) => match outcome.decision() {
                None | Some(RetrainDecision::Pass) => OutcomeClass::Success,
                Some(RetrainDecision::Fail) | Some(RetrainDecision::NoModel) => {
                    OutcomeClass::NotPassing
                }
                Some(RetrainDecision::NoData) => OutcomeClass::NoData,
            },
            Err(err) => Self::of_error(&err.source),
        }
    }

    pub fn of_error(error: &PipelineError) -> Self {
        match error.root() {
            PipelineError::LockHeld { .. } => OutcomeClass::LockHeld,
            PipelineError::StoreUnavailable(_) => OutcomeClass::StoreUnavailable,
            PipelineError::StageTimeout { .. } => OutcomeClass::Timeout,
            _ => OutcomeClass::Error,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            OutcomeClass::Success => 0,
            OutcomeClass::NotPassing | OutcomeClass::NoData => 1,
            OutcomeClass::Error => 2,
            OutcomeClass::StoreUnavailable | OutcomeClass::Timeout => 3,
            // EX_TEMPFAIL
            OutcomeClass::LockHeld => 75,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            OutcomeClass::Success => 200,
            OutcomeClass::NotPassing => 409,
            OutcomeClass::NoData => 424,
            OutcomeClass::LockHeld => 423,
            OutcomeClass::StoreUnavailable => 503,
            OutcomeClass::Timeout => 504,
            OutcomeClass::Error => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::Success => "ok",
            OutcomeClass::NotPassing => "not_passing",
            OutcomeClass::NoData => "no_data",
            OutcomeClass::LockHeld => "locked",
            OutcomeClass::StoreUnavailable => "unavailable",
            OutcomeClass::Timeout => "timeout",
            OutcomeClass::Error => "error",
        }
    }
}

/// JSON body returned by the HTTP trigger and printed by `--json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub execution_id: Uuid,
    pub decision: Option<RetrainDecision>,
    pub score: Option<f64>,
    pub threshold: Option<f64>,
    pub retrained: bool,
    pub promoted_version: Option<String>,
    /// Diagnostic only; branch on the status code
    pub message: String,
}

impl TriggerResponse {
    pub fn from_result(result: &Result<RunOutcome, RunError>) -> Self {
        let class = OutcomeClass::of(result);
        match result {
            Ok(outcome) => Self {
                status: class.as_str().to_string(),
                execution_id: outcome.execution_id,
                decision: outcome.report.as_ref().map(|r| r.decision),
                score: outcome.report.as_ref().and_then(|r| r.score),
                threshold: outcome.report.as_ref().map(|r| r.threshold),
                retrained: outcome.retrained,
                promoted_version: outcome.promoted.as_ref().map(|p| p.version.clone()),
                message: summarize(outcome),
            },
            Err(err) => Self {
                status: class.as_str().to_string(),
                execution_id: err.execution_id,
                decision: None,
                score: None,
                threshold: None,
                retrained: false,
                promoted_version: None,
                message: err.to_string(),
            },
        }
    }
}

/// One-line description of a successful run
pub fn summarize(outcome: &RunOutcome) -> String {
    let mut parts = Vec::new();
    if outcome.refreshed {
        parts.push("processed data refreshed".to_string());
    }
    if let Some(pointer) = &outcome.promoted {
        parts.push(format!("promoted {}", pointer.version));
    }
    match &outcome.report {
        Some(report) => match report.score {
            Some(score) => parts.push(format!(
                "{}: accuracy {:.4} against threshold {:.4}",
                report.decision, score, report.threshold
            )),
            None => parts.push(report.decision.to_string()),
        },
        None if parts.is_empty() => parts.push(format!("{} completed", outcome.mode)),
        None => {}
    }
    parts.join("; ")
}
