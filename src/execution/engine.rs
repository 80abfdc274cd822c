//! Retrain engine - sequences stages and applies the retrain decision

use crate::core::{
    ArtifactKeys, DecisionReport, ExecutionStatus, PipelineConfig, PipelineError,
    RetrainDecision, RunState, Stage, Table,
};
use crate::execution::decision::decide;
use crate::execution::lease::PromotionLease;
use crate::execution::manifest::ProcessedManifest;
use crate::execution::promotion::{self, sha256_hex, ModelPointer, ModelVersion};
use crate::execution::StageExecutor;
use crate::model::ForestParams;
use crate::stages::{self, Shuffle, TrainOutput};
use crate::store::{self, ArtifactClient, ObjectStore, StagingArea};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// What an invocation was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Decision only, no writes
    Check,
    /// Refresh, decide, retrain when needed
    Run,
    /// Refresh and always retrain
    Retrain,
    Ingest,
    Preprocess,
    Train,
    Rollback,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Check => "check",
            RunMode::Run => "run",
            RunMode::Retrain => "retrain",
            RunMode::Ingest => "ingest",
            RunMode::Preprocess => "preprocess",
            RunMode::Train => "train",
            RunMode::Rollback => "rollback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "check" => Some(RunMode::Check),
            "run" => Some(RunMode::Run),
            "retrain" => Some(RunMode::Retrain),
            "ingest" => Some(RunMode::Ingest),
            "preprocess" => Some(RunMode::Preprocess),
            "train" => Some(RunMode::Train),
            "rollback" => Some(RunMode::Rollback),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: Uuid,
        pipeline_name: String,
        mode: RunMode,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        detail: String,
    },
    StageSkipped {
        stage: Stage,
        reason: String,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    DecisionMade {
        report: DecisionReport,
        after_training: bool,
    },
    ModelPromoted {
        pointer: ModelPointer,
    },
    RunCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Result of a successful invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub execution_id: Uuid,
    pub mode: RunMode,
    pub state: RunState,

    /// Decision taken before any training
    pub initial: Option<DecisionReport>,

    /// Decision that describes the store after the run
    pub report: Option<DecisionReport>,

    /// Whether new processed data was published
    pub refreshed: bool,

    pub retrained: bool,

    pub promoted: Option<ModelPointer>,
}

impl RunOutcome {
    fn begin(mode: RunMode) -> Self {
        let mut state = RunState::new();
        state.start();
        Self {
            execution_id: state.execution_id,
            mode,
            state,
            initial: None,
            report: None,
            refreshed: false,
            retrained: false,
            promoted: None,
        }
    }

    pub fn decision(&self) -> Option<RetrainDecision> {
        self.report.as_ref().map(|r| r.decision)
    }
}

/// A run that stopped on an error
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunError {
    pub execution_id: Uuid,
    pub mode: RunMode,
    pub state: RunState,
    pub source: PipelineError,
}

/// Outcome of the refresh step
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    /// No raw dataset in the store; processed data is used as-is
    RawMissing,
    /// Raw data matches the manifest of the current processed data
    Unchanged,
    Published(ProcessedManifest),
}

enum Ingested {
    Absent,
    Unchanged,
    Changed { table: Table, raw_sha256: String },
}

/// Main retrain engine
pub struct RetrainEngine {
    config: PipelineConfig,
    client: ArtifactClient,
    executor: StageExecutor,
    staging_root: Option<PathBuf>,
    event_handlers: Vec<EventHandler>,
}

impl RetrainEngine {
    /// Engine over the store named in `config`
    pub fn new(config: PipelineConfig) -> Self {
        let store = store::open(&config.store);
        Self::with_store(config, store)
    }

    pub fn with_store(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let client = ArtifactClient::new(store, config.retry.clone());
        let executor = StageExecutor::new(&config.timeouts);
        Self {
            config,
            client,
            executor,
            staging_root: None,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Override one stage's deadline
    pub fn with_stage_deadline(mut self, stage: Stage, deadline: Duration) -> Self {
        self.executor = self.executor.with_deadline(stage, deadline);
        self
    }

    /// Create staging areas under `root` instead of the system temp directory
    pub fn with_staging_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn client(&self) -> &ArtifactClient {
        &self.client
    }

    fn keys(&self) -> &ArtifactKeys {
        &self.config.keys
    }

    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    fn staging(&self) -> Result<StagingArea, PipelineError> {
        match &self.staging_root {
            Some(root) => StagingArea::new_in(root),
            None => StagingArea::new(),
        }
    }

    fn begin(&self, mode: RunMode) -> RunOutcome {
        let run = RunOutcome::begin(mode);
        info!(
            "Starting {} of {} ({})",
            mode, self.config.name, run.execution_id
        );
        self.emit(ExecutionEvent::RunStarted {
            execution_id: run.execution_id,
            pipeline_name: self.config.name.clone(),
            mode,
        });
        run
    }

    fn finish(
        &self,
        mut run: RunOutcome,
        result: Result<(), PipelineError>,
    ) -> Result<RunOutcome, RunError> {
        match result {
            Ok(()) => {
                run.state.complete();
                self.emit(ExecutionEvent::RunCompleted {
                    execution_id: run.execution_id,
                    status: run.state.status,
                });
                Ok(run)
            }
            Err(source) => {
                run.state.fail();
                warn!("{} of {} failed: {}", run.mode, self.config.name, source);
                self.emit(ExecutionEvent::RunCompleted {
                    execution_id: run.execution_id,
                    status: run.state.status,
                });
                Err(RunError {
                    execution_id: run.execution_id,
                    mode: run.mode,
                    state: run.state,
                    source,
                })
            }
        }
    }

    async fn stage<T, Fut>(
        &self,
        state: &mut RunState,
        stage: Stage,
        body: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        state.mark_running(stage);
        self.emit(ExecutionEvent::StageStarted { stage });
        match self.executor.run(stage, body).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.fail_stage(state, stage, &e);
                Err(e)
            }
        }
    }

    fn complete_stage(&self, state: &mut RunState, stage: Stage, detail: String) {
        state.mark_completed(stage, detail.clone());
        self.emit(ExecutionEvent::StageCompleted { stage, detail });
    }

    fn skip_stage(&self, state: &mut RunState, stage: Stage, reason: &str) {
        state.mark_skipped(stage, reason.to_string());
        self.emit(ExecutionEvent::StageSkipped {
            stage,
            reason: reason.to_string(),
        });
    }

    fn fail_stage(&self, state: &mut RunState, stage: Stage, error: &PipelineError) {
        state.mark_failed(stage, error.to_string());
        self.emit(ExecutionEvent::StageFailed {
            stage,
            error: error.to_string(),
        });
    }

    /// Evaluate the current model and decide; never writes
    pub async fn check(&self) -> Result<RunOutcome, RunError> {
        let mut run = self.begin(RunMode::Check);
        let result = self.decide(&mut run.state, false).await.map(|report| {
            run.initial = Some(report.clone());
            run.report = Some(report);
        });
        self.finish(run, result)
    }

    /// Full cycle; `force` trains even when the current model passes
    pub async fn run(&self, force: bool) -> Result<RunOutcome, RunError> {
        let mode = if force { RunMode::Retrain } else { RunMode::Run };
        let mut run = self.begin(mode);
        let result = self.full_cycle(&mut run, force).await;
        self.finish(run, result)
    }

    /// Forced full cycle
    pub async fn retrain(&self) -> Result<RunOutcome, RunError> {
        self.run(true).await
    }

    /// Load and validate the raw dataset without publishing anything
    pub async fn ingest(&self) -> Result<RunOutcome, RunError> {
        let mut run = self.begin(RunMode::Ingest);
        let result = self
            .stage(&mut run.state, Stage::Ingest, self.validate_raw())
            .await
            .map(|detail| self.complete_stage(&mut run.state, Stage::Ingest, detail));
        self.finish(run, result)
    }

    /// Ingest and preprocess the raw dataset, publishing regardless of the manifest
    pub async fn preprocess(&self) -> Result<RunOutcome, RunError> {
        let mut run = self.begin(RunMode::Preprocess);
        let result = match self.refresh(&mut run.state, run.execution_id, true).await {
            Ok(Refresh::Published(_)) => {
                run.refreshed = true;
                Ok(())
            }
            Ok(Refresh::RawMissing) => Err(PipelineError::NotFound(self.keys().raw.clone())),
            Ok(Refresh::Unchanged) => Ok(()),
            Err(e) => Err(e),
        };
        self.finish(run, result)
    }

    /// Train on the processed data and promote the result
    pub async fn train(&self) -> Result<RunOutcome, RunError> {
        let mut run = self.begin(RunMode::Train);
        let result = self.train_cycle(&mut run).await;
        self.finish(run, result)
    }

    /// Re-point the canonical model at a stored version
    pub async fn rollback(&self, version: &str) -> Result<RunOutcome, RunError> {
        let mut run = self.begin(RunMode::Rollback);
        let result = self.rollback_cycle(&mut run, version).await;
        self.finish(run, result)
    }

    /// Stored model versions, oldest first
    pub async fn versions(&self) -> Result<Vec<ModelVersion>, PipelineError> {
        promotion::list_versions(&self.client, self.keys()).await
    }

    /// Pointer of the canonical model; `None` when missing or stale
    pub async fn current_model(&self) -> Result<Option<ModelPointer>, PipelineError> {
        promotion::verified_pointer(&self.client, self.keys()).await
    }

    async fn full_cycle(&self, run: &mut RunOutcome, force: bool) -> Result<(), PipelineError> {
        let refresh = self.refresh(&mut run.state, run.execution_id, false).await?;
        run.refreshed = matches!(refresh, Refresh::Published(_));

        let initial = self.decide(&mut run.state, false).await?;
        run.initial = Some(initial.clone());
        run.report = Some(initial.clone());

        if initial.decision == RetrainDecision::NoData {
            self.skip_stage(&mut run.state, Stage::Train, "no processed data");
            self.skip_stage(&mut run.state, Stage::Promote, "no processed data");
            return Ok(());
        }
        if !force && !initial.decision.requires_training() {
            self.skip_stage(&mut run.state, Stage::Train, "current model passes");
            self.skip_stage(&mut run.state, Stage::Promote, "current model passes");
            return Ok(());
        }

        let pointer = self.train_and_promote(&mut run.state, run.execution_id).await?;
        run.retrained = true;
        run.promoted = Some(pointer);
        run.report = Some(self.decide(&mut run.state, true).await?);
        Ok(())
    }

    async fn train_cycle(&self, run: &mut RunOutcome) -> Result<(), PipelineError> {
        let pointer = self.train_and_promote(&mut run.state, run.execution_id).await?;
        run.retrained = true;
        run.promoted = Some(pointer);
        run.report = Some(self.decide(&mut run.state, true).await?);
        Ok(())
    }

    async fn rollback_cycle(&self, run: &mut RunOutcome, version: &str) -> Result<(), PipelineError> {
        let lease = self.acquire_lease(&mut run.state, Stage::Promote, run.execution_id).await?;
        let result = self
            .stage(
                &mut run.state,
                Stage::Promote,
                self.rollback_under(&lease, version, run.execution_id),
            )
            .await;
        self.release_lease(lease).await;

        let pointer = result?;
        self.complete_stage(
            &mut run.state,
            Stage::Promote,
            format!("rolled back to {}", pointer.version),
        );
        self.emit(ExecutionEvent::ModelPromoted {
            pointer: pointer.clone(),
        });
        run.promoted = Some(pointer);
        Ok(())
    }

    /// Publish fresh processed data when the raw data changed
    async fn refresh(
        &self,
        state: &mut RunState,
        execution_id: Uuid,
        force: bool,
    ) -> Result<Refresh, PipelineError> {
        let ingested = self
            .stage(state, Stage::Ingest, self.fetch_and_ingest(force))
            .await?;

        let (table, raw_sha256) = match ingested {
            Ingested::Absent => {
                let reason = format!("no raw data at {}", self.keys().raw);
                self.skip_stage(state, Stage::Ingest, &reason);
                self.skip_stage(state, Stage::Preprocess, &reason);
                return Ok(Refresh::RawMissing);
            }
            Ingested::Unchanged => {
                let reason = "raw data unchanged since last preprocess";
                self.skip_stage(state, Stage::Ingest, reason);
                self.skip_stage(state, Stage::Preprocess, reason);
                return Ok(Refresh::Unchanged);
            }
            Ingested::Changed { table, raw_sha256 } => (table, raw_sha256),
        };
        self.complete_stage(
            state,
            Stage::Ingest,
            format!("{} rows, {} columns", table.len(), table.columns.len()),
        );

        let manifest = self
            .stage(
                state,
                Stage::Preprocess,
                self.publish_processed(table, raw_sha256, execution_id),
            )
            .await?;
        self.complete_stage(
            state,
            Stage::Preprocess,
            format!("published {} ({} rows)", self.keys().processed, manifest.rows),
        );
        Ok(Refresh::Published(manifest))
    }

    async fn fetch_and_ingest(&self, force: bool) -> Result<Ingested, PipelineError> {
        let keys = self.keys();
        let staging = self.staging()?;
        let Some(raw) = self.client.fetch(&keys.raw, &staging).await? else {
            return Ok(Ingested::Absent);
        };
        let raw_sha256 = sha256_hex(&raw.read().await?);

        if !force {
            if let Some(manifest) = ProcessedManifest::load(&self.client, keys).await? {
                let shuffle = Shuffle::from(&self.config.preprocess);
                if manifest.raw_sha256 != raw_sha256 {
                    info!("Raw data changed since last preprocess");
                } else if manifest.shuffle != shuffle {
                    info!(
                        "Shuffle changed ({:?} -> {:?}), reprocessing",
                        manifest.shuffle, shuffle
                    );
                } else if self.client.exists(&keys.processed).await? {
                    info!("Raw data unchanged ({}), skipping preprocess", &raw_sha256[..12]);
                    return Ok(Ingested::Unchanged);
                }
            }
        }

        let table = stages::ingest(&raw, &self.config.label_column).await?;
        Ok(Ingested::Changed { table, raw_sha256 })
    }

    async fn validate_raw(&self) -> Result<String, PipelineError> {
        let keys = self.keys();
        let staging = self.staging()?;
        let raw = self
            .client
            .fetch(&keys.raw, &staging)
            .await?
            .ok_or_else(|| PipelineError::NotFound(keys.raw.clone()))?;
        let table = stages::ingest(&raw, &self.config.label_column).await?;
        Ok(format!(
            "{} is valid: {} rows, {} columns",
            keys.raw,
            table.len(),
            table.columns.len()
        ))
    }

    async fn publish_processed(
        &self,
        table: Table,
        raw_sha256: String,
        execution_id: Uuid,
    ) -> Result<ProcessedManifest, PipelineError> {
        let keys = self.keys();
        let staging = self.staging()?;
        let shuffle = Shuffle::from(&self.config.preprocess);
        let rows = table.len();
        let columns = table.columns.clone();

        let staged = stages::preprocess_file(table, shuffle, &keys.processed, &staging).await?;
        let processed_sha256 = sha256_hex(&staged.read().await?);
        self.client.put(&keys.processed, &staged.path).await?;

        let manifest = ProcessedManifest {
            raw_key: keys.raw.clone(),
            raw_sha256,
            processed_sha256,
            shuffle,
            rows,
            columns,
            created_at: Utc::now(),
            execution_id,
        };
        manifest.save(&self.client, keys).await?;
        Ok(manifest)
    }

    async fn decide(
        &self,
        state: &mut RunState,
        after_training: bool,
    ) -> Result<DecisionReport, PipelineError> {
        let report = self
            .stage(state, Stage::Evaluate, self.evaluate_current())
            .await?;

        let detail = match report.score {
            Some(score) => format!(
                "{} (accuracy {:.4}, threshold {:.4})",
                report.decision, score, report.threshold
            ),
            None => report.decision.to_string(),
        };
        self.complete_stage(state, Stage::Evaluate, detail);
        self.emit(ExecutionEvent::DecisionMade {
            report: report.clone(),
            after_training,
        });
        Ok(report)
    }

    async fn evaluate_current(&self) -> Result<DecisionReport, PipelineError> {
        let staging = self.staging()?;
        decide(&self.client, self.keys(), self.config.threshold, &staging).await
    }

    async fn acquire_lease(
        &self,
        state: &mut RunState,
        stage: Stage,
        execution_id: Uuid,
    ) -> Result<PromotionLease, PipelineError> {
        let ttl = Duration::from_secs(self.config.lease_ttl_secs);
        match PromotionLease::acquire(&self.client, &self.keys().lease(), execution_id, ttl).await {
            Ok(lease) => Ok(lease),
            Err(e) => {
                let e = e.in_stage(stage);
                self.fail_stage(state, stage, &e);
                Err(e)
            }
        }
    }

    async fn release_lease(&self, lease: PromotionLease) {
        let key = lease.key().to_string();
        if let Err(e) = lease.release().await {
            warn!("Failed to release lease {}: {}", key, e);
        }
    }

    /// Train and promote while holding the promotion lease
    async fn train_and_promote(
        &self,
        state: &mut RunState,
        execution_id: Uuid,
    ) -> Result<ModelPointer, PipelineError> {
        let lease = self.acquire_lease(state, Stage::Train, execution_id).await?;
        let result = self.train_then_promote(state, execution_id, &lease).await;
        self.release_lease(lease).await;
        result
    }

    async fn train_then_promote(
        &self,
        state: &mut RunState,
        execution_id: Uuid,
        lease: &PromotionLease,
    ) -> Result<ModelPointer, PipelineError> {
        let (staging, trained) = self
            .stage(state, Stage::Train, self.train_on_processed())
            .await?;
        self.complete_stage(
            state,
            Stage::Train,
            format!(
                "{} trees on {} rows",
                trained.model.classifier.n_trees(),
                trained.model.trained_rows
            ),
        );

        let pointer = self
            .stage(
                state,
                Stage::Promote,
                self.promote_trained(&trained, execution_id, lease),
            )
            .await;
        drop(staging);
        let pointer = pointer?;

        self.complete_stage(state, Stage::Promote, format!("version {}", pointer.version));
        self.emit(ExecutionEvent::ModelPromoted {
            pointer: pointer.clone(),
        });
        Ok(pointer)
    }

    /// The returned staging area owns the staged model until promotion ends
    async fn train_on_processed(&self) -> Result<(StagingArea, TrainOutput), PipelineError> {
        let keys = self.keys();
        let staging = self.staging()?;
        let processed = self
            .client
            .fetch(&keys.processed, &staging)
            .await?
            .ok_or_else(|| PipelineError::NotFound(keys.processed.clone()))?;

        let params = ForestParams::from(&self.config.training);
        let output = stages::train(
            &processed,
            &self.config.label_column,
            params,
            &keys.model,
            &staging,
        )
        .await?;
        processed.remove().await;
        Ok((staging, output))
    }

    /// Training can outlive the lease, so ownership is re-checked before any write
    async fn promote_trained(
        &self,
        trained: &TrainOutput,
        execution_id: Uuid,
        lease: &PromotionLease,
    ) -> Result<ModelPointer, PipelineError> {
        let bytes = trained.staged.read().await?;
        lease.verify().await?;
        promotion::promote(&self.client, self.keys(), bytes, execution_id).await
    }

    async fn rollback_under(
        &self,
        lease: &PromotionLease,
        version: &str,
        execution_id: Uuid,
    ) -> Result<ModelPointer, PipelineError> {
        lease.verify().await?;
        promotion::rollback(&self.client, self.keys(), version, execution_id).await
    }
}
