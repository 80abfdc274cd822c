//! CLI command definitions

use crate::core::config::ShuffleMode;
use crate::core::PipelineConfig;
use clap::Args;
use std::net::SocketAddr;

/// Flags shared by every command that runs the engine
#[derive(Debug, Args, Clone, Default)]
pub struct RunFlags {
    /// Print the trigger response as JSON instead of progress output
    #[arg(long)]
    pub json: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Seed overrides for preprocessing and training
#[derive(Debug, Args, Clone, Default)]
pub struct SeedArgs {
    /// Seed for both the preprocessing shuffle and training
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SeedArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(seed) = self.seed {
            config.preprocess.seed = seed;
            config.training.seed = seed;
        }
    }
}

/// Evaluate and decide
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    #[command(flatten)]
    pub flags: RunFlags,
}

/// Full cycle
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Retrain even when the current model passes
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub seeds: SeedArgs,

    #[command(flatten)]
    pub flags: RunFlags,
}

/// Forced full cycle
#[derive(Debug, Args, Clone)]
pub struct RetrainCommand {
    #[command(flatten)]
    pub seeds: SeedArgs,

    #[command(flatten)]
    pub flags: RunFlags,
}

#[derive(Debug, Args, Clone)]
pub struct IngestCommand {
    #[command(flatten)]
    pub flags: RunFlags,
}

#[derive(Debug, Args, Clone)]
pub struct PreprocessCommand {
    /// Shuffle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Draw a new permutation instead of the seeded one
    #[arg(long, conflicts_with = "seed")]
    pub fresh: bool,

    #[command(flatten)]
    pub flags: RunFlags,
}

impl PreprocessCommand {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(seed) = self.seed {
            config.preprocess.seed = seed;
            config.preprocess.shuffle = ShuffleMode::Seeded;
        }
        if self.fresh {
            config.preprocess.shuffle = ShuffleMode::Fresh;
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub seeds: SeedArgs,

    #[command(flatten)]
    pub flags: RunFlags,
}

#[derive(Debug, Args, Clone)]
pub struct VersionsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RollbackCommand {
    /// Version ID as listed by `versions`
    #[arg(long)]
    pub version: String,

    #[command(flatten)]
    pub flags: RunFlags,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by (defaults to the configured pipeline)
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output the effective configuration in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ServeCommand {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}
