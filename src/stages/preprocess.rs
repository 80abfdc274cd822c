//! Preprocess: random row permutation

use crate::core::config::{PreprocessConfig, ShuffleMode};
use crate::core::{PipelineError, Table};
use crate::store::{StagedArtifact, StagingArea};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How rows are permuted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "seed")]
pub enum Shuffle {
    /// Same seed and input always give the same order
    Seeded(u64),
    /// A new order on every run
    Fresh,
}

impl From<&PreprocessConfig> for Shuffle {
    fn from(config: &PreprocessConfig) -> Self {
        match config.shuffle {
            ShuffleMode::Seeded => Shuffle::Seeded(config.seed),
            ShuffleMode::Fresh => Shuffle::Fresh,
        }
    }
}

/// Permute rows; columns and row contents are never changed or dropped
pub fn preprocess(mut table: Table, shuffle: Shuffle) -> Table {
    match shuffle {
        Shuffle::Seeded(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            table.rows.shuffle(&mut rng);
        }
        Shuffle::Fresh => {
            table.rows.shuffle(&mut rand::rng());
        }
    }
    debug!("Shuffled {} rows ({:?})", table.len(), shuffle);
    table
}

/// Preprocess a table and stage the result for upload under `output_key`
pub async fn preprocess_file(
    table: Table,
    shuffle: Shuffle,
    output_key: &str,
    staging: &StagingArea,
) -> Result<StagedArtifact, PipelineError> {
    let processed = preprocess(table, shuffle);
    staging
        .stage_bytes(output_key, processed.to_csv().as_bytes())
        .await
}
