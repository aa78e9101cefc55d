//! Lineage Store
//!
//! Stored lineage for an object is replaced wholesale on re-analysis:
//! delete-then-insert, never a merge.

use crate::lineage::ColumnLineageEntry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory lineage persistence keyed by source object (`schema.object`)
#[derive(Clone, Default)]
pub struct LineageStore {
    entries: Arc<RwLock<HashMap<String, Vec<ColumnLineageEntry>>>>,
}

impl LineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace every stored entry for one source object
    pub async fn replace_for_object(&self, source_object: &str, entries: Vec<ColumnLineageEntry>) {
        let mut map = self.entries.write().await;
        map.remove(source_object);
        map.insert(source_object.to_string(), entries);
    }

    pub async fn for_object(&self, source_object: &str) -> Vec<ColumnLineageEntry> {
        self.entries
            .read()
            .await
            .get(source_object)
            .cloned()
            .unwrap_or_default()
    }
}
