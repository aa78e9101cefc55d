//! Schema Diff Engine
//!
//! The core comparison engine that detects changes between schema snapshots.
//! This is the "git diff" for your database schema.

use crate::detection::SchemaChange;
use crate::error::AppError;
use crate::snapshot::capture::{SchemaSnapshot, SnapshotObject};
use std::collections::HashMap;
use tracing::debug;

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare a baseline snapshot against a current snapshot and return
    /// the typed change records.
    ///
    /// Output order is deterministic: created objects, then dropped
    /// objects, then altered objects, each sorted by `schema.object`.
    /// Byte-equal definitions yield no record, so diffing a snapshot
    /// against itself produces nothing.
    pub fn diff(
        database: &str,
        baseline: &SchemaSnapshot,
        current: &SchemaSnapshot,
        detected_by: &str,
    ) -> Result<Vec<SchemaChange>, AppError> {
        // Equal content digests mean equal payloads; skip the decode
        if baseline.checksum == current.checksum {
            debug!("Snapshots {} and {} share a checksum; no changes", baseline.id, current.id);
            return Ok(Vec::new());
        }

        let baseline_objects = baseline.objects()?;
        let current_objects = current.objects()?;

        let baseline_map: HashMap<String, &SnapshotObject> = baseline_objects
            .iter()
            .map(|o| (o.qualified_name(), o))
            .collect();
        let current_map: HashMap<String, &SnapshotObject> = current_objects
            .iter()
            .map(|o| (o.qualified_name(), o))
            .collect();

        let mut created: Vec<&String> = current_map
            .keys()
            .filter(|k| !baseline_map.contains_key(*k))
            .collect();
        created.sort();

        let mut dropped: Vec<&String> = baseline_map
            .keys()
            .filter(|k| !current_map.contains_key(*k))
            .collect();
        dropped.sort();

        let mut altered: Vec<&String> = current_map
            .keys()
            .filter(|k| {
                baseline_map
                    .get(*k)
                    .map(|old| old.definition != current_map[*k].definition)
                    .unwrap_or(false)
            })
            .collect();
        altered.sort();

        let mut changes = Vec::with_capacity(created.len() + dropped.len() + altered.len());
        for key in created {
            changes.push(SchemaChange::created(database, current_map[key], detected_by));
        }
        for key in dropped {
            changes.push(SchemaChange::dropped(database, baseline_map[key], detected_by));
        }
        for key in altered {
            changes.push(SchemaChange::altered(
                database,
                baseline_map[key],
                current_map[key],
                detected_by,
            ));
        }

        debug!(
            "Diff {} -> {}: {} changes",
            baseline.id,
            current.id,
            changes.len()
        );
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;
    use crate::detection::ChangeKind;
    use crate::snapshot::capture::{encode_payload, SnapshotType};
    use chrono::Utc;
    use uuid::Uuid;

    fn snapshot_of(objects: Vec<SnapshotObject>) -> SchemaSnapshot {
        let mut objects = objects;
        objects.sort_by(|a, b| a.qualified_name().cmp(&b.qualified_name()));
        SchemaSnapshot {
            id: Uuid::new_v4(),
            snapshot_type: SnapshotType::Full,
            schema_filter: None,
            checksum: SchemaSnapshot::compute_checksum(&objects),
            payload: encode_payload(&objects).unwrap(),
            object_count: objects.len(),
            table_count: 0,
            view_count: 0,
            procedure_count: 0,
            function_count: 0,
            captured_at: Utc::now(),
            captured_by: "tester".to_string(),
            is_baseline: false,
        }
    }

    fn table(schema: &str, name: &str, definition: &str) -> SnapshotObject {
        MemoryCatalog::object(schema, name, ObjectKind::Table, definition)
    }

    #[test]
    fn test_diff_against_self_is_empty() {
        let snapshot = snapshot_of(vec![
            table("dbo", "T1", "Id integer"),
            table("dbo", "T2", "Id integer\nName text"),
        ]);
        let changes = DiffEngine::diff("appdb", &snapshot, &snapshot, "tester").unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_object_only_in_baseline_is_a_drop() {
        let baseline = snapshot_of(vec![table("dbo", "T1", "Id integer")]);
        let current = snapshot_of(vec![]);

        let changes = DiffEngine::diff("appdb", &baseline, &current, "tester").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_kind, ChangeKind::Drop);
        assert_eq!(changes[0].qualified_name(), "dbo.T1");
        assert!(changes[0].old_definition.is_some());
        assert!(changes[0].new_definition.is_none());
    }

    #[test]
    fn test_every_delta_appears_exactly_once() {
        let baseline = snapshot_of(vec![
            table("dbo", "Kept", "Id integer"),
            table("dbo", "Gone", "Id integer"),
            table("dbo", "Changed", "Id integer"),
        ]);
        let current = snapshot_of(vec![
            table("dbo", "Kept", "Id integer"),
            table("dbo", "Changed", "Id bigint"),
            table("dbo", "Fresh", "Id integer"),
        ]);

        let changes = DiffEngine::diff("appdb", &baseline, &current, "tester").unwrap();
        assert_eq!(changes.len(), 3);

        let of_kind = |kind: ChangeKind| {
            changes
                .iter()
                .filter(|c| c.change_kind == kind)
                .map(|c| c.qualified_name())
                .collect::<Vec<_>>()
        };
        assert_eq!(of_kind(ChangeKind::Create), vec!["dbo.Fresh"]);
        assert_eq!(of_kind(ChangeKind::Drop), vec!["dbo.Gone"]);
        assert_eq!(of_kind(ChangeKind::Alter), vec!["dbo.Changed"]);
    }

    #[test]
    fn test_output_order_is_creates_drops_alters_alphabetical() {
        let baseline = snapshot_of(vec![
            table("dbo", "Zeta", "v1"),
            table("dbo", "Beta", "v1"),
            table("aaa", "Gone", "v1"),
        ]);
        let current = snapshot_of(vec![
            table("dbo", "Zeta", "v2"),
            table("dbo", "Beta", "v2"),
            table("zzz", "New1", "v1"),
            table("abc", "New2", "v1"),
        ]);

        let changes = DiffEngine::diff("appdb", &baseline, &current, "tester").unwrap();
        let keys: Vec<String> = changes.iter().map(|c| c.qualified_name()).collect();
        assert_eq!(
            keys,
            vec!["abc.New2", "zzz.New1", "aaa.Gone", "dbo.Beta", "dbo.Zeta"]
        );
    }

    #[test]
    fn test_identical_definitions_produce_no_alter() {
        let baseline = snapshot_of(vec![table("dbo", "T1", "Id integer")]);
        // Same content, separately captured snapshot
        let current = snapshot_of(vec![table("dbo", "T1", "Id integer")]);

        let changes = DiffEngine::diff("appdb", &baseline, &current, "tester").unwrap();
        assert!(changes.is_empty());
    }
}
