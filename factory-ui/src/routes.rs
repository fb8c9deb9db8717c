//! HTTP route handlers for the monitoring API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use tracing::warn;

use factory::archive::{ExportOptions, RunArchive, RunInputs, export_run};
use factory::core::types::{CommitRecord, Proposal, RunMeta};
use factory::io::store;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/run", get(get_run))
        .route("/proposals", get(get_proposals))
        .route("/commits", get(get_commits))
        .route("/archive", get(get_archive))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/run - run metadata.
async fn get_run(State(state): State<AppState>) -> Result<Json<RunMeta>, StatusCode> {
    store::read_meta(&state.paths)
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// GET /api/proposals - proposal snapshots (empty when none recorded yet).
async fn get_proposals(State(state): State<AppState>) -> Result<Json<Vec<Proposal>>, StatusCode> {
    store::read_proposals(&state.paths)
        .map(Json)
        .map_err(internal_error)
}

/// GET /api/commits - commit records (empty when nothing finalized yet).
async fn get_commits(State(state): State<AppState>) -> Result<Json<Vec<CommitRecord>>, StatusCode> {
    store::read_commits(&state.paths)
        .map(Json)
        .map_err(internal_error)
}

/// GET /api/archive - assemble an archive document on demand.
///
/// File bodies are never embedded here; use the CLI exporter for full
/// archives.
async fn get_archive(State(state): State<AppState>) -> Result<Json<RunArchive>, StatusCode> {
    let meta = store::read_meta(&state.paths).map_err(|_| StatusCode::NOT_FOUND)?;

    let mut inputs = RunInputs::new(meta);
    inputs.events = store::read_events(&state.paths).map_err(internal_error)?;
    inputs.proposals = store::read_proposals(&state.paths).map_err(internal_error)?;
    inputs.commits = store::read_commits(&state.paths).map_err(internal_error)?;

    let options = ExportOptions::default();
    let archive = export_run(inputs, &options).await.map_err(internal_error)?;
    Ok(Json(archive))
}

fn internal_error(err: anyhow::Error) -> StatusCode {
    warn!(error = %format!("{err:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
