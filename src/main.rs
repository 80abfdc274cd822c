use anyhow::{Context, Result};
use retrain::cli::commands::{HistoryCommand, ServeCommand, ValidateCommand, VersionsCommand};
use retrain::cli::output::*;
use retrain::cli::{Cli, Command};
use retrain::execution::{ExecutionEvent, RetrainEngine, RunError, RunOutcome};
use retrain::persistence::{PersistenceBackend, RunSummary};
use retrain::trigger::{summarize, OutcomeClass, TriggerResponse};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "sqlite"))]
use retrain::persistence::InMemoryPersistence;
#[cfg(feature = "sqlite")]
use retrain::persistence::SqliteRunStore;

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", CROSS, e);
    }

    let code = match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            OutcomeClass::Error.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")
}

async fn dispatch(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Validate(cmd) => validate_config(cli, cmd),
        Command::Versions(cmd) => list_versions(cli, cmd).await,
        Command::History(cmd) => show_history(cli, cmd).await,
        Command::Serve(cmd) => serve(cli, cmd).await,
        command => run_engine(cli, command).await,
    }
}

async fn open_history(no_history: bool) -> Option<Arc<dyn PersistenceBackend>> {
    if no_history {
        return None;
    }
    default_history().await
}

#[cfg(feature = "sqlite")]
async fn default_history() -> Option<Arc<dyn PersistenceBackend>> {
    match SqliteRunStore::with_default_path().await {
        Ok(store) => {
            let store: Arc<dyn PersistenceBackend> = Arc::new(store);
            Some(store)
        }
        Err(e) => {
            warn!("Run history disabled: {:#}", e);
            None
        }
    }
}

// history only lives as long as the process
#[cfg(not(feature = "sqlite"))]
async fn default_history() -> Option<Arc<dyn PersistenceBackend>> {
    let store: Arc<dyn PersistenceBackend> = Arc::new(InMemoryPersistence::new());
    Some(store)
}

async fn run_engine(cli: &Cli, command: &Command) -> Result<i32> {
    let flags = command
        .run_flags()
        .context("Command does not run the pipeline")?
        .clone();
    let config = cli.load_config()?;
    let pipeline_name = config.name.clone();

    let spinner = (!flags.json).then(create_spinner);
    let mut engine = RetrainEngine::new(config);
    if let Some(spinner) = &spinner {
        let spinner = spinner.clone();
        engine = engine.with_event_handler(move |event| match &event {
            ExecutionEvent::StageStarted { stage } => spinner.set_message(stage.to_string()),
            _ => spinner.suspend(|| println!("{}", format_execution_event(&event))),
        });
    }

    let result = match command {
        Command::Check(_) => engine.check().await,
        Command::Run(cmd) => engine.run(cmd.force).await,
        Command::Retrain(_) => engine.retrain().await,
        Command::Ingest(_) => engine.ingest().await,
        Command::Preprocess(_) => engine.preprocess().await,
        Command::Train(_) => engine.train().await,
        Command::Rollback(cmd) => engine.rollback(&cmd.version).await,
        other => anyhow::bail!("{:?} does not run the pipeline", other),
    };

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if let Some(history) = open_history(flags.no_history).await {
        let summary = RunSummary::from_result(&pipeline_name, &result);
        match history.save_run(&summary).await {
            Ok(()) if !flags.json => println!(
                "{} Run saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Ok(()) => {}
            Err(e) => warn!("Failed to save run to history: {:#}", e),
        }
    }

    if flags.json {
        let body = TriggerResponse::from_result(&result);
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_result(&pipeline_name, &result);
    }

    Ok(OutcomeClass::of(&result).exit_code())
}

fn print_result(pipeline_name: &str, result: &Result<RunOutcome, RunError>) {
    let class = OutcomeClass::of(result);
    match result {
        Ok(outcome) => {
            let icon = if class == OutcomeClass::Success { CHECK } else { WARN };
            println!(
                "\n{} {}: {}",
                icon,
                style(pipeline_name).bold(),
                summarize(outcome)
            );
            if let Some(report) = &outcome.report {
                println!("  {}", format_report(report));
            }
        }
        Err(err) => {
            println!(
                "\n{} {} {} {}",
                CROSS,
                style(pipeline_name).bold(),
                style(err.mode).bold(),
                style("failed").red()
            );
            println!("  {}", style(&err.source).red());
            if err.source.is_retryable() {
                println!("  {}", style("Safe to re-run.").dim());
            }
        }
    }
}

fn validate_config(cli: &Cli, cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating configuration...", INFO);

    match cli.load_config() {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            match cli.config_path() {
                Some(path) => println!("  File: {}", style(path.display()).dim()),
                None => println!("  File: {}", style("(defaults)").dim()),
            }
            println!("  Name: {}", style(&config.name).bold());
            println!("  Store: {:?} {}", config.store.backend, style(config.store.root.display()).dim());
            println!("  Threshold: {}", style(config.threshold).cyan());
            println!(
                "  Keys: {} -> {} -> {}",
                style(&config.keys.raw).cyan(),
                style(&config.keys.processed).cyan(),
                style(&config.keys.model).cyan()
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(0)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(OutcomeClass::Error.exit_code())
        }
    }
}

async fn list_versions(cli: &Cli, cmd: &VersionsCommand) -> Result<i32> {
    let config = cli.load_config()?;
    let engine = RetrainEngine::new(config);

    let versions = match engine.versions().await {
        Ok(versions) => versions,
        Err(e) => {
            eprintln!("{} {}", CROSS, style(&e).red());
            return Ok(OutcomeClass::of_error(&e).exit_code());
        }
    };

    if cmd.json {
        let current = engine.current_model().await.ok().flatten();
        let data = serde_json::json!({ "current": current, "versions": versions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if versions.is_empty() {
        println!("{} No model versions stored", INFO);
        return Ok(0);
    }

    println!("{} Model versions (oldest first):", INFO);
    for version in &versions {
        println!("  {}", format_version(version));
    }
    Ok(0)
}

async fn show_history(cli: &Cli, cmd: &HistoryCommand) -> Result<i32> {
    let Some(store) = open_history(false).await else {
        println!("{} Run history is unavailable", WARN);
        return Ok(OutcomeClass::Error.exit_code());
    };

    if let Some(id) = &cmd.execution_id {
        let execution_id = uuid::Uuid::parse_str(id).context("Invalid execution ID format")?;
        match store.load_run(execution_id).await? {
            Some(summary) => print_run_details(&summary)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(0);
    }

    let pipeline_name = match &cmd.pipeline {
        Some(name) => name.clone(),
        None => cli.load_config()?.name,
    };
    let runs: Vec<RunSummary> = store
        .list_runs(&pipeline_name)
        .await?
        .into_iter()
        .take(cmd.limit)
        .collect();

    if cmd.json {
        let data = serde_json::json!({ "pipeline": pipeline_name, "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if runs.is_empty() {
        println!("{} No runs recorded for {}", INFO, style(&pipeline_name).bold());
        return Ok(0);
    }

    println!(
        "{} Run history for {} (latest {}):",
        INFO,
        style(&pipeline_name).bold(),
        runs.len()
    );
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }
    Ok(0)
}

fn print_run_details(summary: &RunSummary) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Mode: {}", summary.mode);
    println!("  Status: {}", format_status(summary.status));
    if let Some(decision) = summary.decision {
        println!("  Decision: {}", format_decision(decision));
    }
    if let (Some(score), Some(threshold)) = (summary.score, summary.threshold) {
        println!("  Accuracy: {:.4} (threshold {:.4})", score, threshold);
    }
    if let Some(version) = &summary.promoted_version {
        println!("  Promoted: {}", style(version).cyan());
    }
    if let Some(error) = &summary.error {
        println!("  Error: {}", style(error).red());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(cli: &Cli, cmd: &ServeCommand) -> Result<i32> {
    use retrain::trigger::server::{self, AppState};

    let config = cli.load_config()?;
    println!(
        "{} Serving {} on {}",
        ROCKET,
        style(&config.name).bold(),
        style(cmd.addr).cyan()
    );
    let engine = Arc::new(RetrainEngine::new(config));
    let history = open_history(cmd.no_history).await;
    server::serve(cmd.addr, AppState::new(engine, history)).await?;
    Ok(0)
}

#[cfg(not(feature = "server"))]
async fn serve(_cli: &Cli, _cmd: &ServeCommand) -> Result<i32> {
    anyhow::bail!("this binary was built without the `server` feature")
}
