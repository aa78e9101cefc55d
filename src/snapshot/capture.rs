//! Snapshot Capture
//!
//! Builds a point-in-time inventory of database objects with their
//! definitions, serialized and zstd-compressed into an opaque payload.
//! The payload must round-trip byte-for-byte through the codec in this
//! module; readers and writers always share one codec version.

use crate::catalog::{CatalogObject, CatalogReader, ObjectKind};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Record stored inside a snapshot payload
pub type SnapshotObject = CatalogObject;

/// Role of a snapshot in the diffing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
    /// The "before" reference state for diffing
    Baseline,
    /// A regular full capture
    Full,
}

/// Immutable capture of catalog state at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub id: Uuid,
    pub snapshot_type: SnapshotType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_filter: Option<String>,
    /// Compressed serialized object list; opaque outside this module
    #[serde(skip_serializing, default)]
    pub payload: Vec<u8>,
    pub checksum: String,
    pub object_count: usize,
    pub table_count: usize,
    pub view_count: usize,
    pub procedure_count: usize,
    pub function_count: usize,
    pub captured_at: DateTime<Utc>,
    pub captured_by: String,
    pub is_baseline: bool,
}

impl SchemaSnapshot {
    /// Decode the compressed object list back out of the payload
    pub fn objects(&self) -> Result<Vec<SnapshotObject>, AppError> {
        decode_payload(&self.payload)
    }

    /// Content digest over the ordered object list. Two snapshots with
    /// equal checksums diff to zero changes.
    pub fn compute_checksum(objects: &[SnapshotObject]) -> String {
        let mut hasher = Sha256::new();
        for obj in objects {
            hasher.update(obj.qualified_name().as_bytes());
            hasher.update([0u8]);
            hasher.update(obj.kind.to_string().as_bytes());
            hasher.update([0u8]);
            hasher.update(obj.definition.as_bytes());
            hasher.update([0u8]);
        }
        let result = hasher.finalize();
        format!("{:x}", result)
    }
}

const ZSTD_LEVEL: i32 = 3;

/// Serialize and compress an object list
pub fn encode_payload(objects: &[SnapshotObject]) -> Result<Vec<u8>, AppError> {
    let json = serde_json::to_vec(objects)
        .map_err(|e| AppError::SnapshotCodec(format!("serialize: {}", e)))?;
    zstd::encode_all(&json[..], ZSTD_LEVEL)
        .map_err(|e| AppError::SnapshotCodec(format!("compress: {}", e)))
}

/// Decompress and deserialize a snapshot payload
pub fn decode_payload(payload: &[u8]) -> Result<Vec<SnapshotObject>, AppError> {
    let json = zstd::decode_all(payload)
        .map_err(|e| AppError::SnapshotCodec(format!("decompress: {}", e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| AppError::SnapshotCodec(format!("deserialize: {}", e)))
}

/// Captures snapshots from a catalog source
pub struct SnapshotEngine;

impl SnapshotEngine {
    /// Enumerate the catalog and build a snapshot. Objects are sorted by
    /// qualified name so payload bytes and checksum are deterministic.
    pub async fn capture<C: CatalogReader>(
        catalog: &C,
        snapshot_type: SnapshotType,
        schema_filter: Option<&str>,
        captured_by: &str,
    ) -> Result<SchemaSnapshot, AppError> {
        let mut objects = catalog.list_objects(schema_filter).await?;
        objects.sort_by(|a, b| a.qualified_name().cmp(&b.qualified_name()));

        let table_count = objects.iter().filter(|o| o.kind == ObjectKind::Table).count();
        let view_count = objects.iter().filter(|o| o.kind == ObjectKind::View).count();
        let procedure_count = objects.iter().filter(|o| o.kind == ObjectKind::Procedure).count();
        let function_count = objects.iter().filter(|o| o.kind == ObjectKind::Function).count();

        let checksum = SchemaSnapshot::compute_checksum(&objects);
        let payload = encode_payload(&objects)?;

        let snapshot = SchemaSnapshot {
            id: Uuid::new_v4(),
            snapshot_type,
            schema_filter: schema_filter.map(|s| s.to_string()),
            payload,
            checksum,
            object_count: objects.len(),
            table_count,
            view_count,
            procedure_count,
            function_count,
            captured_at: Utc::now(),
            captured_by: captured_by.to_string(),
            is_baseline: snapshot_type == SnapshotType::Baseline,
        };

        tracing::debug!(
            "Captured snapshot {}: {} objects ({} tables, {} views, {} procedures, {} functions)",
            snapshot.id,
            snapshot.object_count,
            snapshot.table_count,
            snapshot.view_count,
            snapshot.procedure_count,
            snapshot.function_count
        );

        Ok(snapshot)
    }
}
