//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::catalog::PgCatalog;
use crate::config::Settings;
use crate::detection::{ChangeStore, DetectionOrchestrator, RunStore};
use crate::events::{EventSink, TracingEventSink};
use crate::lineage::LineageStore;
use crate::snapshot::SnapshotStore;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Catalog connection pool
    pub db_pool: Pool,

    /// Catalog reader over the monitored database
    pub catalog: Arc<PgCatalog>,

    /// Versioned snapshot store with baseline tracking
    pub snapshots: SnapshotStore,

    /// Detected schema changes
    pub changes: ChangeStore,

    /// Detection run records
    pub runs: RunStore,

    /// Stored column lineage, bulk-replaced per source object
    pub lineage: LineageStore,

    /// Detection pipeline orchestrator
    pub orchestrator: Arc<DetectionOrchestrator<PgCatalog>>,

    /// Name of the monitored database
    pub database: String,
}

impl AppState {
    /// Create new application state around a catalog pool
    pub fn new(pool: Pool, settings: &Settings) -> Self {
        let catalog = Arc::new(PgCatalog::new(pool.clone()));
        let snapshots = SnapshotStore::new();
        let changes = ChangeStore::new();
        let runs = RunStore::new();
        let lineage = LineageStore::new();
        let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);

        let orchestrator = Arc::new(DetectionOrchestrator::new(
            Arc::clone(&catalog),
            settings.database.database.clone(),
            settings.detection.critical_schemas.clone(),
            snapshots.clone(),
            changes.clone(),
            runs.clone(),
            lineage.clone(),
            events,
        ));

        Self {
            db_pool: pool,
            catalog,
            snapshots,
            changes,
            runs,
            lineage,
            orchestrator,
            database: settings.database.database.clone(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
