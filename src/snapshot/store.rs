//! Schema Snapshot Store
//!
//! Manages versioned schema snapshots for comparison and auditing.
//! Baselines are superseded by later baselines, never deleted.

use crate::error::AppError;
use crate::snapshot::capture::{SchemaSnapshot, SnapshotType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Metadata about a snapshot (lightweight, used for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: Uuid,
    pub snapshot_type: SnapshotType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_filter: Option<String>,
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

impl From<&SchemaSnapshot> for SnapshotMetadata {
    fn from(snapshot: &SchemaSnapshot) -> Self {
        Self {
            id: snapshot.id,
            snapshot_type: snapshot.snapshot_type,
            schema_filter: snapshot.schema_filter.clone(),
            checksum: snapshot.checksum.clone(),
            object_count: snapshot.object_count,
            table_count: snapshot.table_count,
            view_count: snapshot.view_count,
            procedure_count: snapshot.procedure_count,
            function_count: snapshot.function_count,
            captured_at: snapshot.captured_at,
            captured_by: snapshot.captured_by.clone(),
            is_baseline: snapshot.is_baseline,
        }
    }
}

/// Store for managing schema snapshots
#[derive(Clone, Default)]
pub struct SnapshotStore {
    snapshots: Arc<RwLock<Vec<SchemaSnapshot>>>,
    baseline_id: Arc<RwLock<Option<Uuid>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot. The first baseline-typed snapshot (or the very
    /// first snapshot overall) becomes the active baseline.
    pub async fn save(&self, snapshot: SchemaSnapshot) -> SchemaSnapshot {
        let mut snapshots = self.snapshots.write().await;
        let mut baseline = self.baseline_id.write().await;
        let mut snapshot = snapshot;

        if baseline.is_none() || snapshot.is_baseline {
            snapshot.is_baseline = true;
            *baseline = Some(snapshot.id);
        }

        tracing::info!(
            "Saved snapshot {}: {} objects, baseline={}",
            snapshot.id,
            snapshot.object_count,
            snapshot.is_baseline
        );
        snapshots.push(snapshot.clone());
        snapshot
    }

    pub async fn get(&self, id: Uuid) -> Option<SchemaSnapshot> {
        self.snapshots
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// The most recently captured snapshot
    pub async fn latest(&self) -> Option<SchemaSnapshot> {
        self.snapshots.read().await.last().cloned()
    }

    /// The snapshot currently serving as the diff baseline
    pub async fn latest_baseline(&self) -> Option<SchemaSnapshot> {
        let baseline_id = (*self.baseline_id.read().await)?;
        self.get(baseline_id).await
    }

    /// Promote a stored snapshot to baseline, superseding the previous
    /// baseline (which stays in the store).
    pub async fn promote_baseline(&self, id: Uuid) -> Result<(), AppError> {
        let mut snapshots = self.snapshots.write().await;
        let snapshot = snapshots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", id)))?;
        snapshot.is_baseline = true;

        let mut baseline = self.baseline_id.write().await;
        *baseline = Some(id);

        tracing::info!("Promoted snapshot {} to baseline", id);
        Ok(())
    }

    /// List all snapshots (metadata only), newest first
    pub async fn list(&self) -> Vec<SnapshotMetadata> {
        let snapshots = self.snapshots.read().await;
        let mut list: Vec<SnapshotMetadata> = snapshots.iter().map(SnapshotMetadata::from).collect();
        list.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;
    use crate::snapshot::capture::{encode_payload, SnapshotObject};

    fn snapshot(kind: SnapshotType) -> SchemaSnapshot {
        let objects: Vec<SnapshotObject> =
            vec![MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id integer")];
        SchemaSnapshot {
            id: Uuid::new_v4(),
            snapshot_type: kind,
            schema_filter: None,
            checksum: SchemaSnapshot::compute_checksum(&objects),
            payload: encode_payload(&objects).unwrap(),
            object_count: objects.len(),
            table_count: 1,
            view_count: 0,
            procedure_count: 0,
            function_count: 0,
            captured_at: Utc::now(),
            captured_by: "tester".to_string(),
            is_baseline: kind == SnapshotType::Baseline,
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_becomes_baseline() {
        let store = SnapshotStore::new();
        let saved = store.save(snapshot(SnapshotType::Full)).await;
        assert!(saved.is_baseline);
        assert_eq!(store.latest_baseline().await.unwrap().id, saved.id);
    }

    #[tokio::test]
    async fn test_promotion_supersedes_without_deleting() {
        let store = SnapshotStore::new();
        let first = store.save(snapshot(SnapshotType::Baseline)).await;
        let second = store.save(snapshot(SnapshotType::Full)).await;
        assert_eq!(store.latest_baseline().await.unwrap().id, first.id);

        store.promote_baseline(second.id).await.unwrap();
        assert_eq!(store.latest_baseline().await.unwrap().id, second.id);
        // The superseded baseline is still stored
        assert!(store.get(first.id).await.is_some());
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_returns_most_recent_capture() {
        let store = SnapshotStore::new();
        store.save(snapshot(SnapshotType::Baseline)).await;
        let second = store.save(snapshot(SnapshotType::Full)).await;
        assert_eq!(store.latest().await.unwrap().id, second.id);
    }
}
