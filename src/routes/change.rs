//! Schema Change API Routes
//!
//! List and acknowledge detected changes.

use crate::detection::SchemaChange;
use crate::error::{not_found_error, ApiResult};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResponse {
    pub success: bool,
    pub change: SchemaChange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeListResponse {
    pub success: bool,
    pub changes: Vec<SchemaChange>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// List detected changes, newest first
pub async fn list_changes(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ChangeListResponse>> {
    let changes = state.changes.list(query.limit.unwrap_or(100)).await;
    Ok(Json(ChangeListResponse {
        success: true,
        changes,
    }))
}

/// Fetch one change with its impacts and column lineage
pub async fn get_change(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChangeResponse>> {
    let change = state
        .changes
        .get(id)
        .await
        .ok_or_else(|| not_found_error(format!("Change {} not found", id)))?;
    Ok(Json(ChangeResponse {
        success: true,
        change,
    }))
}

/// Acknowledge a pending change
pub async fn acknowledge_change(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChangeResponse>> {
    let change = state.changes.acknowledge(id).await?;
    tracing::info!("Change {} acknowledged", id);
    Ok(Json(ChangeResponse {
        success: true,
        change,
    }))
}
