//! HTTP trigger
//!
//! ```text
//! GET  /health
//! GET  /versions
//! POST /check
//! POST /run[?force=true]
//! POST /retrain
//! ```
//!
//! Every run endpoint answers with a [`TriggerResponse`] and the status code
//! from [`OutcomeClass::http_status`].

use crate::execution::{ModelVersion, RetrainEngine, RunError, RunOutcome};
use crate::persistence::{PersistenceBackend, RunSummary};
use crate::trigger::{OutcomeClass, TriggerResponse};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrainEngine>,
    pub history: Option<Arc<dyn PersistenceBackend>>,
    started: Instant,
}

impl AppState {
    pub fn new(engine: Arc<RetrainEngine>, history: Option<Arc<dyn PersistenceBackend>>) -> Self {
        Self {
            engine,
            history,
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    async fn record(&self, result: &Result<RunOutcome, RunError>) {
        let Some(history) = &self.history else {
            return;
        };
        let summary = RunSummary::from_result(&self.engine.config().name, result);
        if let Err(e) = history.save_run(&summary).await {
            warn!("Failed to record run {}: {:#}", summary.execution_id, e);
        }
    }

    async fn respond(
        &self,
        result: Result<RunOutcome, RunError>,
    ) -> (StatusCode, Json<TriggerResponse>) {
        self.record(&result).await;
        let class = OutcomeClass::of(&result);
        let status =
            StatusCode::from_u16(class.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(TriggerResponse::from_result(&result)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pipeline: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub versions: Vec<ModelVersion>,
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: state.engine.config().name.clone(),
        uptime_secs: state.uptime_secs(),
    };

    (StatusCode::OK, Json(health))
}

/// Decision only
pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let result = state.engine.check().await;
    state.respond(result).await
}

/// Full cycle
pub async fn run(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> (StatusCode, Json<TriggerResponse>) {
    let result = state.engine.run(params.force).await;
    state.respond(result).await
}

/// Forced full cycle
pub async fn retrain(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let result = state.engine.retrain().await;
    state.respond(result).await
}

/// Stored model versions
pub async fn versions(
    State(state): State<AppState>,
) -> Result<Json<VersionsResponse>, (StatusCode, String)> {
    match state.engine.versions().await {
        Ok(versions) => Ok(Json(VersionsResponse { versions })),
        Err(e) => {
            let status = StatusCode::from_u16(OutcomeClass::of_error(&e).http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((status, e.to_string()))
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/versions", get(versions))
        .route("/check", post(check))
        .route("/run", post(run))
        .route("/retrain", post(retrain))
        .with_state(state)
}

/// Serve the trigger until the process is stopped
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Retrain trigger listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}
