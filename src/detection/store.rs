//! Run & Change Stores
//!
//! In-memory persistence for detection runs and detected changes. Each run's
//! record is mutated only by the task that owns it; the stores just provide
//! single-record update semantics.

use crate::detection::{DetectionRun, SchemaChange};
use crate::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store for detection run records, with cancellation flags
#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<Uuid, DetectionRun>>>,
    cancel_requests: Arc<RwLock<HashSet<Uuid>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, run: DetectionRun) {
        self.runs.write().await.insert(run.id, run);
    }

    pub async fn get(&self, id: Uuid) -> Option<DetectionRun> {
        self.runs.read().await.get(&id).cloned()
    }

    /// Apply a mutation to one run under the write lock, returning the
    /// updated record
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<DetectionRun, AppError>
    where
        F: FnOnce(&mut DetectionRun) -> Result<(), AppError>,
    {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))?;
        mutate(run)?;
        Ok(run.clone())
    }

    /// Most recent runs first
    pub async fn recent(&self, limit: usize) -> Vec<DetectionRun> {
        let runs = self.runs.read().await;
        let mut list: Vec<_> = runs.values().cloned().collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        list.truncate(limit);
        list
    }

    /// Ask a live run to stop before its next change
    pub async fn request_cancel(&self, id: Uuid) -> Result<(), AppError> {
        let runs = self.runs.read().await;
        let run = runs
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))?;
        if run.state.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Run {} already finished ({:?})",
                id, run.state
            )));
        }
        drop(runs);
        self.cancel_requests.write().await.insert(id);
        Ok(())
    }

    pub async fn cancel_requested(&self, id: Uuid) -> bool {
        self.cancel_requests.read().await.contains(&id)
    }
}

/// Store for detected schema changes
#[derive(Clone, Default)]
pub struct ChangeStore {
    changes: Arc<RwLock<HashMap<Uuid, SchemaChange>>>,
}

impl ChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, change: SchemaChange) {
        self.changes.write().await.insert(change.id, change);
    }

    pub async fn get(&self, id: Uuid) -> Option<SchemaChange> {
        self.changes.read().await.get(&id).cloned()
    }

    /// Most recent changes first
    pub async fn list(&self, limit: usize) -> Vec<SchemaChange> {
        let changes = self.changes.read().await;
        let mut list: Vec<_> = changes.values().cloned().collect();
        list.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        list.truncate(limit);
        list
    }

    pub async fn acknowledge(&self, id: Uuid) -> Result<SchemaChange, AppError> {
        let mut changes = self.changes.write().await;
        let change = changes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Change {} not found", id)))?;
        change.acknowledge()?;
        Ok(change.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;
    use crate::detection::{RunState, RunType};

    #[tokio::test]
    async fn test_run_store_update_and_recent() {
        let store = RunStore::new();
        let run = DetectionRun::new(RunType::Manual, None, "tester");
        let id = run.id;
        store.insert(run).await;

        let updated = store
            .update(id, |r| {
                r.total_objects = 12;
                r.transition(RunState::Running)
            })
            .await
            .unwrap();
        assert_eq!(updated.total_objects, 12);
        assert_eq!(updated.state, RunState::Running);

        assert_eq!(store.recent(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_request_only_for_live_runs() {
        let store = RunStore::new();
        let mut run = DetectionRun::new(RunType::Manual, None, "tester");
        run.transition(RunState::Cancelled).unwrap();
        let id = run.id;
        store.insert(run).await;

        assert!(store.request_cancel(id).await.is_err());
        assert!(!store.cancel_requested(id).await);
    }

    #[tokio::test]
    async fn test_change_store_acknowledge() {
        let store = ChangeStore::new();
        let obj = MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id integer");
        let change = SchemaChange::created("appdb", &obj, "tester");
        let id = change.id;
        store.insert(change).await;

        let acked = store.acknowledge(id).await.unwrap();
        assert_eq!(acked.status, crate::detection::ProcessingStatus::Acknowledged);
        assert!(store.acknowledge(id).await.is_err());
    }
}
