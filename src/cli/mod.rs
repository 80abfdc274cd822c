//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::PipelineConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{
    CheckCommand, HistoryCommand, IngestCommand, PreprocessCommand, RetrainCommand,
    RollbackCommand, RunCommand, RunFlags, ServeCommand, TrainCommand, ValidateCommand,
    VersionsCommand,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Configuration file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "retrain.yaml";

/// Accuracy-gated retraining for a tabular classifier
#[derive(Debug, Parser, Clone)]
#[command(name = "retrain")]
#[command(version)]
#[command(about = "Accuracy-gated model retraining pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to pipeline configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the accuracy threshold
    #[arg(long, global = true)]
    pub threshold: Option<f64>,

    /// Override the bucket directory of the filesystem store
    #[arg(long, global = true)]
    pub store_root: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Evaluate the current model and print the decision; writes nothing
    Check(CheckCommand),

    /// Refresh processed data, decide, and retrain when the model is missing or failing
    Run(RunCommand),

    /// Refresh processed data and retrain unconditionally
    Retrain(RetrainCommand),

    /// Load and validate the raw dataset
    Ingest(IngestCommand),

    /// Publish processed data from the raw dataset
    Preprocess(PreprocessCommand),

    /// Train on the processed data and promote the result
    Train(TrainCommand),

    /// List stored model versions
    Versions(VersionsCommand),

    /// Re-promote a stored model version
    Rollback(RollbackCommand),

    /// Show run history
    History(HistoryCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Serve the HTTP trigger
    Serve(ServeCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Configuration file to load, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                local.exists().then(|| local.to_path_buf())
            }
        }
    }

    /// Load the configuration and apply global and per-command overrides
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match self.config_path() {
            Some(path) => PipelineConfig::from_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(root) = &self.store_root {
            config.store.root = root.clone();
        }
        self.command.apply_overrides(&mut config);

        config.validate().context("Invalid configuration after overrides")?;
        Ok(config)
    }
}

impl Command {
    /// Output flags of the commands that run the engine
    pub fn run_flags(&self) -> Option<&RunFlags> {
        match self {
            Command::Check(cmd) => Some(&cmd.flags),
            Command::Run(cmd) => Some(&cmd.flags),
            Command::Retrain(cmd) => Some(&cmd.flags),
            Command::Ingest(cmd) => Some(&cmd.flags),
            Command::Preprocess(cmd) => Some(&cmd.flags),
            Command::Train(cmd) => Some(&cmd.flags),
            Command::Rollback(cmd) => Some(&cmd.flags),
            Command::Versions(_) | Command::History(_) | Command::Validate(_) | Command::Serve(_) => {
                None
            }
        }
    }

    fn apply_overrides(&self, config: &mut PipelineConfig) {
        match self {
            Command::Run(cmd) => cmd.seeds.apply(config),
            Command::Retrain(cmd) => cmd.seeds.apply(config),
            Command::Preprocess(cmd) => cmd.apply(config),
            Command::Train(cmd) => cmd.seeds.apply(config),
            _ => {}
        }
    }
}
