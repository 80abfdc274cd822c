//! Canonical artifact keys
//!
//! These names are the contract between independently invoked stages:
//!
//! | key | written by | read by |
//! |---|---|---|
//! | `raw` (`data/iris.csv`) | upstream | ingest |
//! | `processed` (`processed_data/iris_processed.csv`) | preprocess | train, evaluate |
//! | `<processed>.manifest.json` | preprocess | run (change detection) |
//! | `model` (`models/model.json`) | promote | evaluate |
//! | `<model>.pointer` | promote | evaluate, versions |
//! | `models/versions/<stem>-<version>.<ext>` | promote | rollback |
//! | `locks/<model file>.lease` | train | train |

use crate::store::validate_key;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};

/// Store keys used by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactKeys {
    /// Raw dataset uploaded by whoever produces the data
    pub raw: String,

    /// Shuffled dataset consumed by training and evaluation
    pub processed: String,

    /// Canonical "current model" key
    pub model: String,
}

impl Default for ArtifactKeys {
    fn default() -> Self {
        Self {
            raw: "data/iris.csv".to_string(),
            processed: "processed_data/iris_processed.csv".to_string(),
            model: "models/model.json".to_string(),
        }
    }
}

impl ArtifactKeys {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_key(&self.raw)?;
        validate_key(&self.processed)?;
        validate_key(&self.model)?;
        Ok(())
    }

    /// Record describing how the processed blob was produced
    pub fn manifest(&self) -> String {
        format!("{}.manifest.json", self.processed)
    }

    /// Record naming the version currently held by the canonical key
    pub fn pointer(&self) -> String {
        format!("{}.pointer", self.model)
    }

    /// Prefix under which immutable model versions are stored
    pub fn versions_prefix(&self) -> String {
        match self.model.rsplit_once('/') {
            Some((dir, _)) => format!("{}/versions/", dir),
            None => "versions/".to_string(),
        }
    }

    /// Key for one immutable model version
    pub fn version(&self, version_id: &str) -> String {
        let (stem, ext) = self.model_stem_and_ext();
        match ext {
            Some(ext) => format!("{}{}-{}.{}", self.versions_prefix(), stem, version_id, ext),
            None => format!("{}{}-{}", self.versions_prefix(), stem, version_id),
        }
    }

    /// Recover the version id from a version key, if it belongs to this model
    pub fn version_id_of(&self, key: &str) -> Option<String> {
        let (stem, ext) = self.model_stem_and_ext();
        let rest = key.strip_prefix(&self.versions_prefix())?;
        let rest = rest.strip_prefix(stem)?.strip_prefix('-')?;
        let id = match ext {
            Some(ext) => rest.strip_suffix(ext)?.strip_suffix('.')?,
            None => rest,
        };
        if id.is_empty() || id.contains('/') {
            None
        } else {
            Some(id.to_string())
        }
    }

    /// Lease key guarding promotion of the canonical model
    pub fn lease(&self) -> String {
        format!("locks/{}.lease", self.model_file_name())
    }

    fn model_file_name(&self) -> &str {
        self.model.rsplit('/').next().unwrap_or(&self.model)
    }

    fn model_stem_and_ext(&self) -> (&str, Option<&str>) {
        let file = self.model_file_name();
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file, None),
        }
    }
}
