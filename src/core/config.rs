//! Pipeline configuration from YAML

use crate::core::keys::ArtifactKeys;
use crate::core::state::Stage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level pipeline configuration loaded from YAML
///
/// Every field has a default, so an empty document is a valid configuration
/// that reproduces the original iris deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name (used for run history)
    pub name: String,

    /// Object store backend
    pub store: StoreConfig,

    /// Canonical artifact keys
    pub keys: ArtifactKeys,

    /// Minimum accuracy for the current model to pass
    pub threshold: f64,

    /// Name of the label column in every dataset
    pub label_column: String,

    pub preprocess: PreprocessConfig,

    pub training: TrainingConfig,

    /// Per-stage deadlines
    pub timeouts: TimeoutConfig,

    /// Retry policy for transient store failures
    pub retry: RetryConfig,

    /// How long a promotion lease stays valid without being released
    pub lease_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "iris-retrain".to_string(),
            store: StoreConfig::default(),
            keys: ArtifactKeys::default(),
            threshold: 0.99,
            label_column: "species".to_string(),
            preprocess: PreprocessConfig::default(),
            training: TrainingConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            lease_ttl_secs: 900,
        }
    }
}

/// Which object store the pipeline talks to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Bucket directory for the filesystem backend
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("bucket-demo-project"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// A local directory laid out like a bucket
    Fs,
    /// Process-local, lost on exit
    Memory,
}

/// How preprocessing permutes rows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    /// Reproducible permutation from `seed`
    Seeded,
    /// New permutation on every run
    Fresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreprocessConfig {
    pub shuffle: ShuffleMode,
    pub seed: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            shuffle: ShuffleMode::Seeded,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub n_estimators: usize,
    /// Maximum tree depth; unlimited when absent
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub ingest_secs: u64,
    pub preprocess_secs: u64,
    pub train_secs: u64,
    pub evaluate_secs: u64,
    pub promote_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ingest_secs: 300,
            preprocess_secs: 300,
            train_secs: 300,
            evaluate_secs: 300,
            promote_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn for_stage(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Ingest => self.ingest_secs,
            Stage::Preprocess => self.preprocess_secs,
            Stage::Train => self.train_secs,
            Stage::Evaluate => self.evaluate_secs,
            Stage::Promote => self.promote_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per store call, including the first
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), doubling up to the cap
    pub fn backoff(&self, retry: usize) -> Duration {
        let exp = retry.saturating_sub(1).min(16) as u32;
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = if yaml.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be within [0, 1], got {}", self.threshold);
        }

        if self.label_column.trim().is_empty() {
            anyhow::bail!("label_column must not be empty");
        }

        self.keys
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid key in configuration: {}", e))?;

        let keys = [&self.keys.raw, &self.keys.processed, &self.keys.model];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                if a == b {
                    anyhow::bail!("artifact keys must be distinct, '{}' is used twice", a);
                }
            }
        }

        for stage in Stage::ALL {
            if self.timeouts.for_stage(stage) == 0 {
                anyhow::bail!("timeout for stage '{}' must be greater than zero", stage);
            }
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.training.n_estimators == 0 {
            anyhow::bail!("training.n_estimators must be at least 1");
        }

        if self.training.min_samples_split < 2 {
            anyhow::bail!("training.min_samples_split must be at least 2");
        }

        if self.lease_ttl_secs == 0 {
            anyhow::bail!("lease_ttl_secs must be greater than zero");
        }

        // The lease must outlive every stage deadline a holder can run through
        let held_for = self
            .timeouts
            .train_secs
            .saturating_add(self.timeouts.evaluate_secs)
            .saturating_add(self.timeouts.promote_secs);
        if self.lease_ttl_secs < held_for {
            anyhow::bail!(
                "lease_ttl_secs ({}) must be at least train + evaluate + promote timeouts ({}s)",
                self.lease_ttl_secs,
                held_for
            );
        }

        if self.store.backend == StoreBackend::Fs && self.store.root.as_os_str().is_empty() {
            anyhow::bail!("store.root is required for the fs backend");
        }

        Ok(())
    }
}
