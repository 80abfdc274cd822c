//! Classifier interface and the serialized model artifact

pub mod forest;

pub use forest::{ForestParams, RandomForest};

use crate::core::{Dataset, PipelineError};
use serde::{Deserialize, Serialize};

/// Anything that can learn labels from numeric features
pub trait Classifier {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[String]) -> Result<(), PipelineError>;

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<String>, PipelineError>;
}

const FORMAT: &str = "retrain-model/v1";

/// A trained predictor together with the schema it was trained against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,

    /// Feature columns, in the order the classifier consumes them
    pub feature_columns: Vec<String>,

    pub label_column: String,

    /// Number of rows the model was fitted on
    pub trained_rows: usize,

    pub classifier: RandomForest,
}

impl ModelArtifact {
    /// Fit a new forest on `dataset`
    pub fn train(dataset: &Dataset, params: ForestParams) -> Result<Self, PipelineError> {
        let mut classifier = RandomForest::new(params);
        classifier.fit(&dataset.features, &dataset.labels)?;
        Ok(Self {
            format: FORMAT.to_string(),
            feature_columns: dataset.feature_columns.clone(),
            label_column: dataset.label_column.clone(),
            trained_rows: dataset.len(),
            classifier,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self)
            .map_err(|e| PipelineError::Internal(format!("failed to serialize model: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        let artifact: ModelArtifact = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidData(format!("corrupt model artifact: {}", e)))?;
        if artifact.format != FORMAT {
            return Err(PipelineError::InvalidData(format!(
                "unsupported model format '{}'",
                artifact.format
            )));
        }
        if artifact.feature_columns.is_empty() {
            return Err(PipelineError::InvalidData(
                "model artifact lists no feature columns".to_string(),
            ));
        }
        Ok(artifact)
    }

    /// Predict labels for a dataset whose features follow `feature_columns`
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<String>, PipelineError> {
        if dataset.feature_columns != self.feature_columns {
            return Err(PipelineError::SchemaMismatch {
                expected: self.feature_columns.clone(),
                found: dataset.feature_columns.clone(),
            });
        }
        self.classifier.predict(&dataset.features)
    }
}
