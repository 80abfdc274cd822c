//! Retrain-decision state machine
//!
//! ```text
//! processed data missing           -> NO_DATA
//! processed present, model missing -> NO_MODEL
//! both present                     -> evaluate, then PASS (score >= threshold) or FAIL
//! ```
//!
//! Reads only. Evaluation errors propagate unchanged; they are never turned
//! into a score or a decision.

use crate::core::{ArtifactKeys, DecisionReport, PipelineError, RetrainDecision};
use crate::execution::promotion::pointer_for;
use crate::stages::evaluate;
use crate::store::{ArtifactClient, StagingArea};
use tracing::info;

pub async fn decide(
    client: &ArtifactClient,
    keys: &ArtifactKeys,
    threshold: f64,
    staging: &StagingArea,
) -> Result<DecisionReport, PipelineError> {
    let Some(data) = client.fetch(&keys.processed, staging).await? else {
        info!("No processed data at {}", keys.processed);
        return Ok(DecisionReport::not_ready(RetrainDecision::NoData, threshold));
    };

    let Some(model) = client.fetch(&keys.model, staging).await? else {
        info!("No model at {}", keys.model);
        data.remove().await;
        return Ok(DecisionReport::not_ready(RetrainDecision::NoModel, threshold));
    };

    let model_bytes = model.read().await?;
    let model_version = pointer_for(client, keys, &model_bytes)
        .await?
        .map(|p| p.version);

    let score = evaluate(&model, &data).await;
    model.remove().await;
    data.remove().await;

    let report = DecisionReport::scored(score?, threshold, model_version);
    info!(
        "Decision {}: accuracy {:.4} against threshold {:.4}",
        report.decision,
        report.score.unwrap_or_default(),
        threshold
    );
    Ok(report)
}
