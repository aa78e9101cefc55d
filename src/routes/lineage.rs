//! Column Lineage API Routes
//!
//! The standalone parser seam plus stored-lineage and downstream-dependency
//! lookups.

use crate::error::{AppError, ApiResult};
use crate::impact::{DependencyWalker, LineageDependency};
use crate::lineage::{ColumnLineageEntry, LineageExtraction, LineageParser};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseLineageRequest {
    pub schema: String,
    pub object: String,
    pub definition: String,
    /// Also persist the extracted entries (replaces stored lineage)
    #[serde(default)]
    pub store: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseLineageResponse {
    pub success: bool,
    pub result: LineageExtraction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageListResponse {
    pub success: bool,
    pub entries: Vec<ColumnLineageEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DependencyQuery {
    pub column: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyResponse {
    pub success: bool,
    pub dependencies: Vec<LineageDependency>,
}

/// Parse a procedural SQL body and extract column lineage
pub async fn parse_lineage(
    State(state): State<SharedState>,
    Json(req): Json<ParseLineageRequest>,
) -> ApiResult<Json<ParseLineageResponse>> {
    if req.definition.trim().is_empty() {
        return Err(AppError::Validation("definition must not be empty".to_string()));
    }

    let result = LineageParser::extract(&req.schema, &req.object, &req.definition);

    if req.store && result.success {
        let key = format!("{}.{}", req.schema, req.object);
        state
            .lineage
            .replace_for_object(&key, result.entries.clone())
            .await;
    }

    Ok(Json(ParseLineageResponse {
        success: result.success,
        result,
    }))
}

/// Stored lineage entries for one object
pub async fn get_lineage(
    State(state): State<SharedState>,
    Path((schema, object)): Path<(String, String)>,
) -> ApiResult<Json<LineageListResponse>> {
    let key = format!("{}.{}", schema, object);
    let entries = state.lineage.for_object(&key).await;
    Ok(Json(LineageListResponse {
        success: true,
        entries,
    }))
}

/// Downstream dependency closure for one object (optionally one column)
pub async fn get_dependencies(
    State(state): State<SharedState>,
    Path((schema, object)): Path<(String, String)>,
    Query(query): Query<DependencyQuery>,
) -> ApiResult<Json<DependencyResponse>> {
    let dependencies = DependencyWalker::downstream_closure(
        &*state.catalog,
        &schema,
        &object,
        query.column.as_deref(),
    )
    .await?;

    Ok(Json(DependencyResponse {
        success: true,
        dependencies,
    }))
}
