//! Run control handlers
//!
//! POST /runs/{clean,clean-history,consult,enrich,enrichment-load,feed-root,
//! update-blocklist,purge-history}, DELETE /batches/:batch_id, GET /stats

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{CredentialMode, DeleteOutcome, MergeStrategy, PipelineStats};
use crate::workflow::{CleanRequest, RunPermit};
use crate::AppState;

/// 202 response body of every run start
#[derive(Debug, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub operation: String,
}

#[derive(Debug, Deserialize)]
pub struct FilesRequest {
    pub files: Vec<PathBuf>,
    /// Commit newly seen identifiers (clean-history only)
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsultRequest {
    pub files: Vec<PathBuf>,
    #[serde(default = "default_mode")]
    pub mode: CredentialMode,
}

fn default_mode() -> CredentialMode {
    CredentialMode::Primary
}

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub files: Vec<PathBuf>,
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub backup: bool,
}

#[derive(Debug, Deserialize)]
pub struct BlocklistRequest {
    pub blocklist: PathBuf,
    pub root: PathBuf,
    #[serde(default)]
    pub backup: bool,
}

impl From<&RunPermit> for RunAccepted {
    fn from(permit: &RunPermit) -> Self {
        Self {
            run_id: permit.run_id(),
            operation: permit.operation().to_string(),
        }
    }
}

fn require_files(files: &[PathBuf]) -> ApiResult<()> {
    if files.is_empty() {
        return Err(ApiError::BadRequest("No files given".to_string()));
    }
    Ok(())
}

fn begin(state: &AppState, operation: &str) -> ApiResult<RunPermit> {
    state
        .pipeline
        .try_begin(operation)
        .map_err(|e| ApiError::Conflict(e.to_string()))
}

/// Run `task` in the background; failures land in `last_error`
fn spawn_run<T, F>(state: &AppState, accepted: RunAccepted, task: F) -> (StatusCode, Json<RunAccepted>)
where
    F: Future<Output = recon_common::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let run_id = accepted.run_id;
    let op = accepted.operation.clone();
    let last_error = state.last_error.clone();

    tokio::spawn(async move {
        tracing::info!(run_id = %run_id, operation = %op, "Background run started");
        match task.await {
            Ok(_) => tracing::info!(run_id = %run_id, operation = %op, "Background run completed"),
            Err(e) => {
                tracing::error!(run_id = %run_id, operation = %op, error = %e, "Background run failed");
                *last_error.write().await = Some(format!("{}: {}", op, e));
            }
        }
    });

    (StatusCode::ACCEPTED, Json(accepted))
}

/// POST /runs/clean
pub async fn start_clean(
    State(state): State<AppState>,
    Json(request): Json<CleanRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "clean")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.clean(permit, request).await
    });
    Ok(accepted)
}

/// POST /runs/clean-history
pub async fn start_clean_history(
    State(state): State<AppState>,
    Json(request): Json<FilesRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "clean-history")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.clean_by_history(permit, request.files, request.persist).await
    });
    Ok(accepted)
}

/// POST /runs/consult
pub async fn start_consult(
    State(state): State<AppState>,
    Json(request): Json<ConsultRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "consult")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.consult(permit, request.files, request.mode).await
    });
    Ok(accepted)
}

/// POST /runs/enrich
pub async fn start_enrich(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "enrich")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline
            .enrich(permit, request.files, request.strategy, request.backup)
            .await
    });
    Ok(accepted)
}

/// POST /runs/enrichment-load
pub async fn start_enrichment_load(
    State(state): State<AppState>,
    Json(request): Json<FilesRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "enrichment-load")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.load_enrichment(permit, request.files).await
    });
    Ok(accepted)
}

/// POST /runs/feed-root
pub async fn start_feed_root(
    State(state): State<AppState>,
    Json(request): Json<FilesRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    require_files(&request.files)?;
    let permit = begin(&state, "feed-root")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.feed_root(permit, request.files).await
    });
    Ok(accepted)
}

/// POST /runs/update-blocklist
pub async fn start_update_blocklist(
    State(state): State<AppState>,
    Json(request): Json<BlocklistRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let permit = begin(&state, "update-blocklist")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline
            .update_blocklist(permit, request.blocklist, request.root, request.backup)
            .await
    });
    Ok(accepted)
}

/// POST /runs/purge-history
pub async fn start_purge_history(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let permit = begin(&state, "purge-history")?;
    let pipeline = state.pipeline.clone();
    let accepted = spawn_run(&state, RunAccepted::from(&permit), async move {
        pipeline.purge_history(permit).await
    });
    Ok(accepted)
}

/// DELETE /batches/:batch_id
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<DeleteOutcome>> {
    let outcome = state.pipeline.delete_batch(&batch_id).await?;
    Ok(Json(outcome))
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<PipelineStats>> {
    Ok(Json(state.pipeline.stats().await?))
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs/clean", post(start_clean))
        .route("/runs/clean-history", post(start_clean_history))
        .route("/runs/consult", post(start_consult))
        .route("/runs/enrich", post(start_enrich))
        .route("/runs/enrichment-load", post(start_enrichment_load))
        .route("/runs/feed-root", post(start_feed_root))
        .route("/runs/update-blocklist", post(start_update_blocklist))
        .route("/runs/purge-history", post(start_purge_history))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new().route("/batches/:batch_id", delete(delete_batch))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}
