//! Train: fit a classifier on the processed dataset

use crate::core::config::TrainingConfig;
use crate::core::{Dataset, PipelineError, Table};
use crate::model::{ForestParams, ModelArtifact};
use crate::stages::blocking;
use crate::store::{StagedArtifact, StagingArea};
use tracing::info;

/// A freshly trained model, staged and ready for promotion
#[derive(Debug)]
pub struct TrainOutput {
    pub staged: StagedArtifact,
    pub model: ModelArtifact,
}

impl From<&TrainingConfig> for ForestParams {
    fn from(config: &TrainingConfig) -> Self {
        ForestParams {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            seed: config.seed,
        }
    }
}

/// Fit a model on a staged processed dataset and stage the serialized model
pub async fn train(
    processed: &StagedArtifact,
    label_column: &str,
    params: ForestParams,
    output_key: &str,
    staging: &StagingArea,
) -> Result<TrainOutput, PipelineError> {
    let table = Table::read(&processed.path).await?;
    let dataset = Dataset::from_table(&table, label_column)?;
    if dataset.is_empty() {
        return Err(PipelineError::InvalidData(format!(
            "{} has no rows to train on",
            processed.key
        )));
    }
    let rows = dataset.len();

    let model = blocking(move || ModelArtifact::train(&dataset, params)).await?;
    let staged = staging.stage_bytes(output_key, &model.to_bytes()?).await?;

    info!(
        "Trained {} trees on {} rows ({} features, seed {})",
        model.classifier.n_trees(),
        rows,
        model.feature_columns.len(),
        params.seed
    );
    Ok(TrainOutput { staged, model })
}
