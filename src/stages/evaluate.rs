//! Evaluate: accuracy of a model on a labeled dataset

use crate::core::{Dataset, PipelineError, Table};
use crate::model::ModelArtifact;
use crate::stages::blocking;
use crate::store::StagedArtifact;
use tracing::info;

/// Fraction of predictions equal to the true labels
pub fn accuracy(truth: &[String], predicted: &[String]) -> Result<f64, PipelineError> {
    if truth.is_empty() {
        return Err(PipelineError::InvalidData(
            "cannot compute accuracy on an empty dataset".to_string(),
        ));
    }
    if truth.len() != predicted.len() {
        return Err(PipelineError::Internal(format!(
            "{} labels but {} predictions",
            truth.len(),
            predicted.len()
        )));
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / truth.len() as f64)
}

/// Score a staged model against a staged dataset
///
/// The dataset must carry exactly the feature columns the model was trained
/// on (in any order) plus the model's label column; anything else is a
/// `SchemaMismatch`.
pub async fn evaluate(model: &StagedArtifact, data: &StagedArtifact) -> Result<f64, PipelineError> {
    let model_bytes = model.read().await?;
    let table = Table::read(&data.path).await?;
    let data_key = data.key.clone();

    let score = blocking(move || {
        let model = ModelArtifact::from_bytes(&model_bytes)?;
        if table.column_index(&model.label_column).is_none() {
            return Err(PipelineError::SchemaMismatch {
                expected: model.feature_columns.clone(),
                found: table.columns.clone(),
            });
        }
        let dataset = Dataset::with_feature_order(&table, &model.label_column, &model.feature_columns)?;
        let predicted = model.predict(&dataset)?;
        accuracy(&dataset.labels, &predicted)
    })
    .await?;

    info!("Model accuracy on {}: {:.4}", data_key, score);
    Ok(score)
}
