//! Snapshot API Routes
//!
//! On-demand snapshot capture, listing, and a read-only diff of the
//! current catalog state against the latest baseline.

use crate::detection::SchemaChange;
use crate::error::{AppError, ApiResult};
use crate::snapshot::store::SnapshotMetadata;
use crate::snapshot::{DiffEngine, SnapshotEngine, SnapshotType};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub schema_filter: Option<String>,
    pub captured_by: Option<String>,
    /// Capture directly as the new baseline
    #[serde(default)]
    pub as_baseline: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub success: bool,
    pub message: String,
    pub snapshot: SnapshotMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotListResponse {
    pub success: bool,
    pub snapshots: Vec<SnapshotMetadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub success: bool,
    pub changes: Vec<SchemaChange>,
}

/// Capture a snapshot of the current catalog state
pub async fn create_snapshot(
    State(state): State<SharedState>,
    Json(req): Json<CreateSnapshotRequest>,
) -> ApiResult<Json<SnapshotResponse>> {
    let snapshot_type = if req.as_baseline {
        SnapshotType::Baseline
    } else {
        SnapshotType::Full
    };
    let captured_by = req.captured_by.unwrap_or_else(|| "api".to_string());

    let snapshot = SnapshotEngine::capture(
        &*state.catalog,
        snapshot_type,
        req.schema_filter.as_deref(),
        &captured_by,
    )
    .await?;
    let snapshot = state.snapshots.save(snapshot).await;

    tracing::info!(
        "Snapshot {} captured via API ({} objects)",
        snapshot.id,
        snapshot.object_count
    );

    Ok(Json(SnapshotResponse {
        success: true,
        message: format!("Snapshot captured with {} objects", snapshot.object_count),
        snapshot: SnapshotMetadata::from(&snapshot),
    }))
}

/// List all snapshots (metadata only)
pub async fn list_snapshots(
    State(state): State<SharedState>,
) -> ApiResult<Json<SnapshotListResponse>> {
    let snapshots = state.snapshots.list().await;
    Ok(Json(SnapshotListResponse {
        success: true,
        snapshots,
    }))
}

/// Diff the current catalog state against the latest baseline without
/// persisting anything
pub async fn diff_against_baseline(
    State(state): State<SharedState>,
) -> ApiResult<Json<DiffResponse>> {
    let baseline = state
        .snapshots
        .latest_baseline()
        .await
        .ok_or_else(|| AppError::NotFound("No baseline snapshot available".to_string()))?;

    let current = SnapshotEngine::capture(
        &*state.catalog,
        SnapshotType::Full,
        baseline.schema_filter.as_deref(),
        "api",
    )
    .await?;

    let changes = DiffEngine::diff(&state.database, &baseline, &current, "api")?;
    Ok(Json(DiffResponse {
        success: true,
        changes,
    }))
}
