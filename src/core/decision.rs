//! Retrain decision values and the accuracy gate

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of the retrain state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrainDecision {
    /// No processed dataset in the store; nothing can be evaluated
    NoData,
    /// Processed data exists but no model has been promoted yet
    NoModel,
    /// Current model meets the threshold
    Pass,
    /// Current model is below the threshold
    Fail,
}

impl RetrainDecision {
    /// Whether the pipeline should produce a new model in response
    pub fn requires_training(&self) -> bool {
        matches!(self, RetrainDecision::NoModel | RetrainDecision::Fail)
    }

    /// NO_DATA and NO_MODEL mean "not yet evaluable", not "model is bad"
    pub fn is_not_ready(&self) -> bool {
        matches!(self, RetrainDecision::NoData | RetrainDecision::NoModel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrainDecision::NoData => "NO_DATA",
            RetrainDecision::NoModel => "NO_MODEL",
            RetrainDecision::Pass => "PASS",
            RetrainDecision::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NO_DATA" => Some(RetrainDecision::NoData),
            "NO_MODEL" => Some(RetrainDecision::NoModel),
            "PASS" => Some(RetrainDecision::Pass),
            "FAIL" => Some(RetrainDecision::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for RetrainDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accuracy gate: a score equal to the threshold passes
pub fn gate(score: f64, threshold: f64) -> RetrainDecision {
    if score >= threshold {
        RetrainDecision::Pass
    } else {
        RetrainDecision::Fail
    }
}

/// Decision plus the evidence it was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub decision: RetrainDecision,

    /// Accuracy of the current model, present only for PASS/FAIL
    pub score: Option<f64>,

    pub threshold: f64,

    /// Pointer version of the evaluated model, when one was recorded
    pub model_version: Option<String>,
}

impl DecisionReport {
    pub fn not_ready(decision: RetrainDecision, threshold: f64) -> Self {
        Self {
            decision,
            score: None,
            threshold,
            model_version: None,
        }
    }

    pub fn scored(score: f64, threshold: f64, model_version: Option<String>) -> Self {
        Self {
            decision: gate(score, threshold),
            score: Some(score),
            threshold,
            model_version,
        }
    }
}
