//! Catalog Access Module
//!
//! Reads the monitored database's object catalog: inventory, dependency
//! edges, foreign keys and execution telemetry. Everything the detection
//! core needs from the database goes through the [`CatalogReader`] trait so
//! the engine can run against any catalog source.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// Kind of database object tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
    Procedure,
    Function,
    Unknown,
}

impl ObjectKind {
    /// Objects whose definition is a procedural SQL body worth parsing for lineage
    pub fn is_procedural(&self) -> bool {
        matches!(self, ObjectKind::Procedure | ObjectKind::Function)
    }

    pub fn from_catalog_code(code: &str) -> Self {
        match code {
            "table" => ObjectKind::Table,
            "view" => ObjectKind::View,
            "procedure" => ObjectKind::Procedure,
            "function" => ObjectKind::Function,
            _ => ObjectKind::Unknown,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Procedure => "procedure",
            ObjectKind::Function => "function",
            ObjectKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One object in the catalog inventory, with its definition text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl CatalogObject {
    /// Map key used throughout the diff and dependency engines
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// One object that depends on another, as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentObject {
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    /// Column on the dependent side, when the edge is column-level (FKs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_column: Option<String>,
}

impl DependentObject {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Read-only catalog access consumed by the detection core.
///
/// Futures are declared `Send` so orchestrator runs can move across the
/// Tokio executor; implementations just write `async fn`.
pub trait CatalogReader: Send + Sync {
    /// Number of scannable objects, optionally restricted to one schema
    fn count_objects(
        &self,
        schema_filter: Option<&str>,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Full object inventory with definitions, system schemas excluded
    fn list_objects(
        &self,
        schema_filter: Option<&str>,
    ) -> impl Future<Output = Result<Vec<CatalogObject>, AppError>> + Send;

    /// Objects referencing the given object (optionally a specific column)
    /// in their definition text
    fn expression_dependents(
        &self,
        schema: &str,
        object: &str,
        column: Option<&str>,
    ) -> impl Future<Output = Result<Vec<DependentObject>, AppError>> + Send;

    /// Tables holding a foreign key that points at the given table
    fn foreign_key_dependents(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = Result<Vec<DependentObject>, AppError>> + Send;

    /// Best-effort execution count for a routine; callers degrade to zero
    /// on failure
    fn execution_count(
        &self,
        schema: &str,
        object: &str,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}

/// Production catalog reader backed by PostgreSQL system views
pub struct PgCatalog {
    pool: Pool,
}

impl PgCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Inventory query: tables get a synthesized column-list definition,
/// views and routines carry their real definition text.
const LIST_OBJECTS_QUERY: &str = r#"
    SELECT
        t.table_schema AS object_schema,
        t.table_name AS object_name,
        'table' AS object_kind,
        COALESCE(
            (SELECT string_agg(
                 c.column_name || ' ' || c.data_type ||
                 CASE WHEN c.is_nullable = 'NO' THEN ' NOT NULL' ELSE '' END,
                 E'\n' ORDER BY c.ordinal_position)
             FROM information_schema.columns c
             WHERE c.table_schema = t.table_schema
               AND c.table_name = t.table_name),
            '') AS definition
    FROM information_schema.tables t
    WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
      AND t.table_type = 'BASE TABLE'
      AND ($1::text IS NULL OR t.table_schema = $1)
    UNION ALL
    SELECT
        v.table_schema,
        v.table_name,
        'view',
        COALESCE(v.view_definition, '')
    FROM information_schema.views v
    WHERE v.table_schema NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR v.table_schema = $1)
    UNION ALL
    SELECT
        n.nspname,
        p.proname,
        CASE p.prokind WHEN 'p' THEN 'procedure' ELSE 'function' END,
        pg_get_functiondef(p.oid)
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND p.prokind IN ('f', 'p')
      AND ($1::text IS NULL OR n.nspname = $1)
    ORDER BY 1, 2
"#;

const COUNT_OBJECTS_QUERY: &str = r#"
    SELECT
        (SELECT COUNT(*) FROM information_schema.tables t
         WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
           AND t.table_type = 'BASE TABLE'
           AND ($1::text IS NULL OR t.table_schema = $1))
      + (SELECT COUNT(*) FROM information_schema.views v
         WHERE v.table_schema NOT IN ('pg_catalog', 'information_schema')
           AND ($1::text IS NULL OR v.table_schema = $1))
      + (SELECT COUNT(*) FROM pg_proc p
         JOIN pg_namespace n ON n.oid = p.pronamespace
         WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
           AND p.prokind IN ('f', 'p')
           AND ($1::text IS NULL OR n.nspname = $1)) AS total
"#;

/// Views whose definition references the target, plus routines whose body
/// mentions it. Routine matching is textual, the same granularity the
/// catalog itself offers for procedural bodies.
const EXPRESSION_DEPENDENTS_QUERY: &str = r#"
    SELECT DISTINCT
        vtu.view_schema AS object_schema,
        vtu.view_name AS object_name,
        'view' AS object_kind
    FROM information_schema.view_table_usage vtu
    WHERE vtu.table_schema = $1
      AND vtu.table_name = $2
    UNION
    SELECT
        n.nspname,
        p.proname,
        CASE p.prokind WHEN 'p' THEN 'procedure' ELSE 'function' END
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND p.prokind IN ('f', 'p')
      AND p.prosrc ILIKE '%' || $2 || '%'
      AND ($3::text IS NULL OR p.prosrc ILIKE '%' || $3 || '%')
    ORDER BY 1, 2
"#;

/// Column-level variant: only views that use the specific column
const EXPRESSION_COLUMN_DEPENDENTS_QUERY: &str = r#"
    SELECT DISTINCT
        vcu.view_schema AS object_schema,
        vcu.view_name AS object_name,
        'view' AS object_kind
    FROM information_schema.view_column_usage vcu
    WHERE vcu.table_schema = $1
      AND vcu.table_name = $2
      AND vcu.column_name = $3
    UNION
    SELECT
        n.nspname,
        p.proname,
        CASE p.prokind WHEN 'p' THEN 'procedure' ELSE 'function' END
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND p.prokind IN ('f', 'p')
      AND p.prosrc ILIKE '%' || $2 || '%'
      AND p.prosrc ILIKE '%' || $3 || '%'
    ORDER BY 1, 2
"#;

const FK_DEPENDENTS_QUERY: &str = r#"
    SELECT DISTINCT
        tc.table_schema AS object_schema,
        tc.table_name AS object_name,
        kcu.column_name AS via_column
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
        ON tc.constraint_name = ccu.constraint_name
        AND tc.table_schema = ccu.constraint_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND ccu.table_schema = $1
      AND ccu.table_name = $2
    ORDER BY 1, 2
"#;

const EXECUTION_COUNT_QUERY: &str = r#"
    SELECT COALESCE(SUM(calls), 0)::bigint AS calls
    FROM pg_stat_user_functions
    WHERE schemaname = $1 AND funcname = $2
"#;

impl CatalogReader for PgCatalog {
    async fn count_objects(&self, schema_filter: Option<&str>) -> Result<usize, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(COUNT_OBJECTS_QUERY, &[&schema_filter]).await?;
        let total: i64 = row.get("total");
        Ok(total as usize)
    }

    async fn list_objects(&self, schema_filter: Option<&str>) -> Result<Vec<CatalogObject>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_OBJECTS_QUERY, &[&schema_filter]).await?;

        let objects: Vec<CatalogObject> = rows
            .iter()
            .map(|row| CatalogObject {
                schema: row.get("object_schema"),
                name: row.get("object_name"),
                kind: ObjectKind::from_catalog_code(row.get("object_kind")),
                definition: row.get("definition"),
                // PostgreSQL does not record object creation/modification times
                created_at: None,
                modified_at: None,
            })
            .collect();

        debug!("Catalog inventory: {} objects", objects.len());
        Ok(objects)
    }

    async fn expression_dependents(
        &self,
        schema: &str,
        object: &str,
        column: Option<&str>,
    ) -> Result<Vec<DependentObject>, AppError> {
        let client = self.pool.get().await?;
        let rows = match column {
            Some(col) => {
                client
                    .query(EXPRESSION_COLUMN_DEPENDENTS_QUERY, &[&schema, &object, &col])
                    .await?
            }
            None => {
                client
                    .query(EXPRESSION_DEPENDENTS_QUERY, &[&schema, &object, &column])
                    .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| DependentObject {
                schema: row.get("object_schema"),
                name: row.get("object_name"),
                kind: ObjectKind::from_catalog_code(row.get("object_kind")),
                via_column: None,
            })
            .collect())
    }

    async fn foreign_key_dependents(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<DependentObject>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(FK_DEPENDENTS_QUERY, &[&schema, &table]).await?;

        Ok(rows
            .iter()
            .map(|row| DependentObject {
                schema: row.get("object_schema"),
                name: row.get("object_name"),
                kind: ObjectKind::Table,
                via_column: row.get("via_column"),
            })
            .collect())
    }

    async fn execution_count(&self, schema: &str, object: &str) -> Result<i64, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(EXECUTION_COUNT_QUERY, &[&schema, &object]).await?;
        Ok(row.get("calls"))
    }
}
