//! Detection Run API Routes
//!
//! Start, inspect and cancel detection runs. Starting a run returns
//! immediately; the pipeline executes in the background.

use crate::detection::{DetectionRun, RunType};
use crate::error::{not_found_error, ApiResult};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[serde(default)]
    pub run_type: Option<RunType>,
    pub schema_filter: Option<String>,
    pub triggered_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub run: DetectionRun,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunListResponse {
    pub success: bool,
    pub runs: Vec<DetectionRun>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Start a detection run; returns with the run still pending
pub async fn start_run(
    State(state): State<SharedState>,
    Json(req): Json<StartRunRequest>,
) -> ApiResult<Json<RunResponse>> {
    let run_type = req.run_type.unwrap_or(RunType::Manual);
    let triggered_by = req.triggered_by.unwrap_or_else(|| "api".to_string());

    let run = state
        .orchestrator
        .clone()
        .start(run_type, req.schema_filter, &triggered_by)
        .await;

    Ok(Json(RunResponse { success: true, run }))
}

/// List recent runs, newest first
pub async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<RunListResponse>> {
    let runs = state.runs.recent(query.limit.unwrap_or(50)).await;
    Ok(Json(RunListResponse {
        success: true,
        runs,
    }))
}

/// Fetch one run
pub async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunResponse>> {
    let run = state
        .runs
        .get(id)
        .await
        .ok_or_else(|| not_found_error(format!("Run {} not found", id)))?;
    Ok(Json(RunResponse { success: true, run }))
}

/// Ask a live run to stop before its next change
pub async fn cancel_run(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunResponse>> {
    state.runs.request_cancel(id).await?;
    let run = state
        .runs
        .get(id)
        .await
        .ok_or_else(|| not_found_error(format!("Run {} not found", id)))?;

    tracing::info!("Cancellation requested for run {}", id);
    Ok(Json(RunResponse { success: true, run }))
}
