//! Detection Event Interface
//!
//! The core emits plain data events through a narrow sink; transport
//! (push, broadcast, queues) lives outside this service.

use crate::catalog::ObjectKind;
use crate::detection::{ChangeKind, RiskLevel, RunState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Structured progress/result events produced by a detection run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DetectionEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        run_id: Uuid,
        state: RunState,
        processed: usize,
        total: usize,
        changes: usize,
        high_risk: usize,
    },
    #[serde(rename_all = "camelCase")]
    ChangeDetected {
        change_id: Uuid,
        schema: String,
        object: String,
        object_kind: ObjectKind,
        change_kind: ChangeKind,
        risk_level: RiskLevel,
        detected_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        run_id: Uuid,
        total_changes: usize,
        high_risk_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        run_id: Uuid,
        message: String,
    },
}

/// Narrow callback interface consumed by external transports
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DetectionEvent);
}

/// Default sink: structured log lines, no external delivery
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DetectionEvent) {
        match &event {
            DetectionEvent::Progress {
                run_id,
                state,
                processed,
                total,
                ..
            } => {
                tracing::info!(
                    "Run {} progress: {:?} ({}/{} objects)",
                    run_id,
                    state,
                    processed,
                    total
                );
            }
            DetectionEvent::ChangeDetected {
                schema,
                object,
                change_kind,
                risk_level,
                ..
            } => {
                tracing::info!(
                    "Change detected: {:?} {}.{} (risk {:?})",
                    change_kind,
                    schema,
                    object,
                    risk_level
                );
            }
            DetectionEvent::Complete {
                run_id,
                total_changes,
                high_risk_count,
            } => {
                tracing::info!(
                    "Run {} complete: {} changes, {} high-risk",
                    run_id,
                    total_changes,
                    high_risk_count
                );
            }
            DetectionEvent::Failed { run_id, message } => {
                tracing::error!("Run {} failed: {}", run_id, message);
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures every emitted event for ordering assertions
    #[derive(Default)]
    pub struct CollectingSink {
        pub events: Mutex<Vec<DetectionEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: DetectionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
