//! Detection Run Orchestrator
//!
//! Sequences one full detection pass: count objects, capture a snapshot,
//! diff against the latest baseline, analyze each change, finalize.
//! Runs are fire-and-forget: `start` returns the run record immediately
//! and the pipeline executes as an independent task. Changes within one
//! run are processed strictly sequentially; the run record is the single
//! source of truth for progress.

use crate::catalog::CatalogReader;
use crate::detection::store::{ChangeStore, RunStore};
use crate::detection::{
    DetectionRun, ProcessingStatus, RiskLevel, RunState, RunType, SchemaChange,
};
use crate::error::AppError;
use crate::events::{DetectionEvent, EventSink};
use crate::impact::ImpactAnalyzer;
use crate::lineage::store::LineageStore;
use crate::lineage::LineageParser;
use crate::snapshot::capture::{SnapshotEngine, SnapshotType};
use crate::snapshot::diff::DiffEngine;
use crate::snapshot::store::SnapshotStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct DetectionOrchestrator<C: CatalogReader> {
    catalog: Arc<C>,
    database: String,
    critical_schemas: Vec<String>,
    snapshots: SnapshotStore,
    changes: ChangeStore,
    runs: RunStore,
    lineage: LineageStore,
    events: Arc<dyn EventSink>,
}

impl<C: CatalogReader + 'static> DetectionOrchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<C>,
        database: impl Into<String>,
        critical_schemas: Vec<String>,
        snapshots: SnapshotStore,
        changes: ChangeStore,
        runs: RunStore,
        lineage: LineageStore,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            catalog,
            database: database.into(),
            critical_schemas,
            snapshots,
            changes,
            runs,
            lineage,
            events,
        }
    }

    /// Create a run and kick off its pipeline as an independent task.
    /// Returns immediately with the run still Pending.
    pub async fn start(
        self: Arc<Self>,
        run_type: RunType,
        schema_filter: Option<String>,
        triggered_by: &str,
    ) -> DetectionRun {
        let run = DetectionRun::new(run_type, schema_filter, triggered_by);
        self.runs.insert(run.clone()).await;
        info!("Starting detection run {} ({:?})", run.id, run_type);

        let orchestrator = Arc::clone(&self);
        let run_id = run.id;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(run_id).await {
                orchestrator.mark_failed(run_id, &e.to_string()).await;
            }
        });

        run
    }

    /// The full pipeline for one run. Any error escaping this function
    /// fails the run; work already committed stays committed.
    async fn execute(&self, run_id: Uuid) -> Result<(), AppError> {
        let run = self
            .runs
            .get(run_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))?;
        let filter = run.schema_filter.clone();

        let total_objects = self.catalog.count_objects(filter.as_deref()).await?;
        self.advance(run_id, RunState::Running, |r| {
            r.total_objects = total_objects;
            Ok(())
        })
        .await?;

        let baseline = self.snapshots.latest_baseline().await;
        let snapshot_type = if baseline.is_some() {
            SnapshotType::Full
        } else {
            SnapshotType::Baseline
        };
        let current = SnapshotEngine::capture(
            &*self.catalog,
            snapshot_type,
            filter.as_deref(),
            &run.triggered_by,
        )
        .await?;
        let current = self.snapshots.save(current).await;
        self.advance(run_id, RunState::SnapshotTaken, |_| Ok(())).await?;

        let mut detected = match &baseline {
            Some(baseline) => {
                DiffEngine::diff(&self.database, baseline, &current, &run.triggered_by)?
            }
            None => {
                warn!(
                    "Run {}: no baseline snapshot available, diff skipped",
                    run_id
                );
                Vec::new()
            }
        };
        self.advance(run_id, RunState::Compared, |r| {
            r.changes_detected = detected.len();
            Ok(())
        })
        .await?;

        let mut high_risk_count = 0usize;
        for change in detected.iter_mut() {
            // Cancellation is honored between changes; committed work stays
            if self.runs.cancel_requested(run_id).await {
                info!("Run {} cancelled after {} changes", run_id, change_count(&self.runs, run_id).await);
                self.runs
                    .update(run_id, |r| r.transition(RunState::Cancelled))
                    .await?;
                return Ok(());
            }

            self.analyze_change(change).await?;
            if change.is_high_risk() {
                high_risk_count += 1;
            }
            self.changes.insert(change.clone()).await;

            self.events.emit(DetectionEvent::ChangeDetected {
                change_id: change.id,
                schema: change.schema.clone(),
                object: change.object.clone(),
                object_kind: change.object_kind,
                change_kind: change.change_kind,
                risk_level: change.risk_level,
                detected_at: change.detected_at,
            });

            let updated = self
                .runs
                .update(run_id, |r| {
                    r.processed_objects += 1;
                    r.high_risk_count = high_risk_count;
                    Ok(())
                })
                .await?;
            self.emit_progress(&updated);
        }

        self.advance(run_id, RunState::Analyzed, |r| {
            r.high_risk_count = high_risk_count;
            Ok(())
        })
        .await?;

        // The snapshot just diffed becomes the next baseline
        self.snapshots.promote_baseline(current.id).await?;

        let run = self
            .advance(run_id, RunState::Completed, |_| Ok(()))
            .await?;
        self.events.emit(DetectionEvent::Complete {
            run_id,
            total_changes: run.changes_detected,
            high_risk_count: run.high_risk_count,
        });
        info!(
            "Run {} completed: {} changes, {} high-risk",
            run_id, run.changes_detected, run.high_risk_count
        );
        Ok(())
    }

    /// Impact analysis, risk scoring and (for procedural objects) lineage
    /// extraction for one change
    async fn analyze_change(&self, change: &mut SchemaChange) -> Result<(), AppError> {
        let assessment =
            ImpactAnalyzer::analyze(&*self.catalog, change, &self.critical_schemas).await?;
        change.impacts = assessment.impacts;
        change.impact_score = assessment.score;
        change.risk_level = assessment.level;
        change.approval_required = change.risk_level >= RiskLevel::High;
        if change.risk_level == RiskLevel::Low {
            change.status = ProcessingStatus::AutoProcessed;
        }

        if change.object_kind.is_procedural() {
            if let Some(definition) = change.new_definition.clone() {
                let extraction = LineageParser::extract(&change.schema, &change.object, &definition);
                if extraction.success {
                    self.lineage
                        .replace_for_object(&change.qualified_name(), extraction.entries.clone())
                        .await;
                    change.column_changes = extraction.entries;
                } else {
                    warn!(
                        "Lineage extraction failed for {} ({} errors); keeping prior lineage",
                        change.qualified_name(),
                        extraction.errors.len()
                    );
                }
            }
        }
        Ok(())
    }

    /// Advance the run state machine and emit a progress event
    async fn advance<F>(
        &self,
        run_id: Uuid,
        next: RunState,
        mutate: F,
    ) -> Result<DetectionRun, AppError>
    where
        F: FnOnce(&mut DetectionRun) -> Result<(), AppError>,
    {
        let run = self
            .runs
            .update(run_id, |r| {
                mutate(r)?;
                r.transition(next)
            })
            .await?;
        self.emit_progress(&run);
        Ok(run)
    }

    fn emit_progress(&self, run: &DetectionRun) {
        self.events.emit(DetectionEvent::Progress {
            run_id: run.id,
            state: run.state,
            processed: run.processed_objects,
            total: run.total_objects,
            changes: run.changes_detected,
            high_risk: run.high_risk_count,
        });
    }

    /// Top-level catch: the run fails with the message preserved verbatim
    async fn mark_failed(&self, run_id: Uuid, message: &str) {
        let result = self
            .runs
            .update(run_id, |r| {
                if r.state.is_terminal() {
                    return Ok(());
                }
                r.fail(message)
            })
            .await;
        if let Err(e) = result {
            warn!("Could not mark run {} as failed: {}", run_id, e);
        }
        self.events.emit(DetectionEvent::Failed {
            run_id,
            message: message.to_string(),
        });
    }
}

async fn change_count(runs: &RunStore, run_id: Uuid) -> usize {
    runs.get(run_id)
        .await
        .map(|r| r.processed_objects)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;
    use crate::detection::ChangeKind;
    use crate::events::testing::CollectingSink;

    fn orchestrator_with(
        catalog: MemoryCatalog,
    ) -> (Arc<DetectionOrchestrator<MemoryCatalog>>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let orchestrator = Arc::new(DetectionOrchestrator::new(
            Arc::new(catalog),
            "appdb",
            vec!["dbo".to_string()],
            SnapshotStore::new(),
            ChangeStore::new(),
            RunStore::new(),
            LineageStore::new(),
            sink.clone() as Arc<dyn EventSink>,
        ));
        (orchestrator, sink)
    }

    async fn wait_for_terminal(
        orchestrator: &DetectionOrchestrator<MemoryCatalog>,
        run_id: Uuid,
    ) -> DetectionRun {
        for _ in 0..200 {
            if let Some(run) = orchestrator.runs.get(run_id).await {
                if run.state.is_terminal() {
                    return run;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("run {} never reached a terminal state", run_id);
    }

    #[tokio::test]
    async fn test_first_run_establishes_baseline_with_zero_changes() {
        let catalog = MemoryCatalog::with_objects(vec![MemoryCatalog::object(
            "dbo",
            "T1",
            ObjectKind::Table,
            "Id integer",
        )]);
        let (orchestrator, _sink) = orchestrator_with(catalog);

        let run = orchestrator.clone().start(RunType::Manual, None, "tester").await;
        let finished = wait_for_terminal(&orchestrator, run.id).await;

        assert_eq!(finished.state, RunState::Completed);
        assert_eq!(finished.changes_detected, 0);
        assert!(orchestrator.snapshots.latest_baseline().await.is_some());
    }

    #[tokio::test]
    async fn test_second_run_detects_drop_and_promotes_baseline() {
        let catalog = MemoryCatalog::with_objects(vec![
            MemoryCatalog::object("dbo", "Customers", ObjectKind::Table, "Id integer"),
            MemoryCatalog::object("dbo", "Orders", ObjectKind::Table, "Id integer"),
        ]);
        let (orchestrator, sink) = orchestrator_with(catalog);

        // First run: baseline only
        let run = orchestrator.clone().start(RunType::Manual, None, "tester").await;
        wait_for_terminal(&orchestrator, run.id).await;

        // The catalog loses a table; rebuild the orchestrator around the
        // shrunken catalog but keep the stores
        let shrunk = MemoryCatalog::with_objects(vec![MemoryCatalog::object(
            "dbo",
            "Customers",
            ObjectKind::Table,
            "Id integer",
        )]);
        let orchestrator2 = Arc::new(DetectionOrchestrator::new(
            Arc::new(shrunk),
            "appdb",
            vec!["dbo".to_string()],
            orchestrator.snapshots.clone(),
            orchestrator.changes.clone(),
            orchestrator.runs.clone(),
            orchestrator.lineage.clone(),
            sink.clone() as Arc<dyn EventSink>,
        ));

        let run2 = orchestrator2.clone().start(RunType::Manual, None, "tester").await;
        let finished = wait_for_terminal(&orchestrator2, run2.id).await;

        assert_eq!(finished.state, RunState::Completed);
        assert_eq!(finished.changes_detected, 1);
        assert_eq!(finished.high_risk_count, 0);

        let changes = orchestrator2.changes.list(10).await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_kind, ChangeKind::Drop);
        assert_eq!(changes[0].qualified_name(), "dbo.Orders");
        // dbo is a critical schema: 40 + 10
        assert_eq!(changes[0].impact_score, 50);

        // The new (shrunken) snapshot is now the baseline
        let baseline = orchestrator2.snapshots.latest_baseline().await.unwrap();
        assert_eq!(baseline.object_count, 1);

        let events = sink.events.lock().unwrap();
        let change_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DetectionEvent::ChangeDetected { .. }))
            .collect();
        assert_eq!(change_events.len(), 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, DetectionEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_procedural_change_extracts_lineage() {
        let base = vec![MemoryCatalog::object(
            "dbo",
            "AdjustBalance",
            ObjectKind::Procedure,
            "UPDATE dbo.Accounts SET Balance = Balance + @amt",
        )];
        let (orchestrator, sink) = orchestrator_with(MemoryCatalog::with_objects(base.clone()));

        let run = orchestrator.clone().start(RunType::Manual, None, "tester").await;
        wait_for_terminal(&orchestrator, run.id).await;

        let mut altered = base;
        altered[0].definition =
            "UPDATE dbo.Accounts SET Balance = Balance + @amt, UpdatedAt = GETDATE()".to_string();
        let orchestrator2 = Arc::new(DetectionOrchestrator::new(
            Arc::new(MemoryCatalog::with_objects(altered)),
            "appdb",
            vec![],
            orchestrator.snapshots.clone(),
            orchestrator.changes.clone(),
            orchestrator.runs.clone(),
            orchestrator.lineage.clone(),
            sink as Arc<dyn EventSink>,
        ));

        let run2 = orchestrator2.clone().start(RunType::Manual, None, "tester").await;
        let finished = wait_for_terminal(&orchestrator2, run2.id).await;
        assert_eq!(finished.state, RunState::Completed);

        let stored = orchestrator2.lineage.for_object("dbo.AdjustBalance").await;
        assert_eq!(stored.len(), 2);
        let changes = orchestrator2.changes.list(10).await;
        assert_eq!(changes[0].column_changes.len(), 2);
        // Low-risk alteration of an unreferenced procedure: auto-processed
        assert_eq!(changes[0].status, ProcessingStatus::AutoProcessed);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_change() {
        let catalog = MemoryCatalog::with_objects(vec![
            MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id integer"),
            MemoryCatalog::object("dbo", "T2", ObjectKind::Table, "Id integer"),
        ]);
        let (orchestrator, sink) = orchestrator_with(catalog);

        let run = orchestrator.clone().start(RunType::Manual, None, "tester").await;
        wait_for_terminal(&orchestrator, run.id).await;

        // Both tables disappear; the next diff would produce two drops
        let orchestrator2 = Arc::new(DetectionOrchestrator::new(
            Arc::new(MemoryCatalog::with_objects(vec![])),
            "appdb",
            vec![],
            orchestrator.snapshots.clone(),
            orchestrator.changes.clone(),
            orchestrator.runs.clone(),
            orchestrator.lineage.clone(),
            sink.clone() as Arc<dyn EventSink>,
        ));

        // Cancel before the pipeline reaches the per-change loop
        let run2 = DetectionRun::new(RunType::Manual, None, "tester");
        let run2_id = run2.id;
        orchestrator2.runs.insert(run2).await;
        orchestrator2.runs.request_cancel(run2_id).await.unwrap();
        orchestrator2.execute(run2_id).await.unwrap();

        let finished = orchestrator2.runs.get(run2_id).await.unwrap();
        assert_eq!(finished.state, RunState::Cancelled);
        // The diff saw two drops but none were committed
        assert_eq!(finished.changes_detected, 2);
        assert!(orchestrator2.changes.list(10).await.is_empty());
        // No fabricated completion summary
        let events = sink.events.lock().unwrap();
        assert!(!events.iter().any(
            |e| matches!(e, DetectionEvent::Complete { run_id, .. } if *run_id == run2_id)
        ));
    }

    #[tokio::test]
    async fn test_run_survives_telemetry_failure() {
        let mut catalog = MemoryCatalog::with_objects(vec![MemoryCatalog::object(
            "dbo",
            "T1",
            ObjectKind::Table,
            "Id integer",
        )]);
        catalog.telemetry_down = true;
        let (orchestrator, _sink) = orchestrator_with(catalog);

        let run = orchestrator.clone().start(RunType::Manual, None, "tester").await;
        let finished = wait_for_terminal(&orchestrator, run.id).await;
        assert_eq!(finished.state, RunState::Completed);
    }
}
