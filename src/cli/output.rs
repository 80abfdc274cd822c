//! CLI output formatting

use crate::core::{DecisionReport, ExecutionStatus, RetrainDecision};
use crate::execution::{ExecutionEvent, ModelVersion};
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Spinner shown while a stage is running
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_decision(decision: RetrainDecision) -> String {
    match decision {
        RetrainDecision::Pass => style("PASS").green().bold().to_string(),
        RetrainDecision::Fail => style("FAIL").red().bold().to_string(),
        RetrainDecision::NoModel => style("NO_MODEL").yellow().bold().to_string(),
        RetrainDecision::NoData => style("NO_DATA").yellow().bold().to_string(),
    }
}

pub fn format_report(report: &DecisionReport) -> String {
    match report.score {
        Some(score) => format!(
            "{} accuracy {} (threshold {})",
            format_decision(report.decision),
            style(format!("{:.4}", score)).cyan(),
            style(format!("{:.4}", report.threshold)).dim()
        ),
        None => format!(
            "{} (threshold {})",
            format_decision(report.decision),
            style(format!("{:.4}", report.threshold)).dim()
        ),
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let outcome = match (summary.decision, summary.score, &summary.error) {
        (Some(decision), Some(score), _) => {
            format!("{} {:.4}", format_decision(decision), score)
        }
        (Some(decision), None, _) => format_decision(decision),
        (None, _, Some(error)) => style(error).red().to_string(),
        (None, _, None) => format_status(summary.status),
    };

    let mut line = format!(
        "{} {} - {} - {} - {}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(summary.mode).bold(),
        outcome
    );
    if let Some(version) = &summary.promoted_version {
        line.push_str(&format!(" -> {}", style(version).cyan()));
    }
    line
}

pub fn format_version(version: &ModelVersion) -> String {
    if version.current {
        format!("{} {}", style("*").green().bold(), style(&version.version).green())
    } else {
        format!("  {}", version.version)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            execution_id,
            pipeline_name,
            mode,
        } => format!(
            "{} {} {} ({})",
            ROCKET,
            style(mode).bold(),
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { stage } => {
            format!("{} {}", SPINNER, style(stage).cyan())
        }
        ExecutionEvent::StageCompleted { stage, detail } => {
            format!("{} {}: {}", CHECK, style(stage).green(), style(detail).dim())
        }
        ExecutionEvent::StageSkipped { stage, reason } => {
            format!("{} {} ({})", SKIP, style(stage).dim(), style(reason).dim())
        }
        ExecutionEvent::StageFailed { stage, error } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(error).dim())
        }
        ExecutionEvent::DecisionMade {
            report,
            after_training,
        } => {
            let label = if *after_training { "After training" } else { "Decision" };
            format!("{} {}: {}", INFO, label, format_report(report))
        }
        ExecutionEvent::ModelPromoted { pointer } => format!(
            "{} Promoted {} ({})",
            CHECK,
            style(&pointer.version).cyan().bold(),
            style(&pointer.sha256[..12.min(pointer.sha256.len())]).dim()
        ),
        ExecutionEvent::RunCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => style("completed").green().to_string(),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&execution_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
