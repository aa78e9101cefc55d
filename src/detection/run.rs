//! Detection Run State Machine
//!
//! A run walks Pending → Running → SnapshotTaken → Compared → Analyzed →
//! Completed, one step at a time. Failed and Cancelled are terminal and
//! reachable from any non-terminal state. A run never re-enters an earlier
//! state.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunType {
    Scheduled,
    Manual,
}

/// Where a run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Pending,
    Running,
    SnapshotTaken,
    Compared,
    Analyzed,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            RunState::Pending => 0,
            RunState::Running => 1,
            RunState::SnapshotTaken => 2,
            RunState::Compared => 3,
            RunState::Analyzed => 4,
            RunState::Completed => 5,
            // Terminal failure states sit outside the forward progression
            RunState::Failed => u8::MAX,
            RunState::Cancelled => u8::MAX,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }

    /// Forward progression only advances one step; Failed/Cancelled are
    /// reachable from any live state.
    pub fn can_transition_to(self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunState::Failed | RunState::Cancelled => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

/// Orchestration record for one detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRun {
    pub id: Uuid,
    pub run_type: RunType,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_filter: Option<String>,
    pub state: RunState,
    pub total_objects: usize,
    pub processed_objects: usize,
    pub changes_detected: usize,
    pub high_risk_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub triggered_by: String,
}

impl DetectionRun {
    pub fn new(run_type: RunType, schema_filter: Option<String>, triggered_by: &str) -> Self {
        let scope = schema_filter
            .clone()
            .map(|s| format!("schema:{}", s))
            .unwrap_or_else(|| "database".to_string());
        Self {
            id: Uuid::new_v4(),
            run_type,
            scope,
            schema_filter,
            state: RunState::Pending,
            total_objects: 0,
            processed_objects: 0,
            changes_detected: 0,
            high_risk_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
            triggered_by: triggered_by.to_string(),
        }
    }

    /// Move the run to `next`, stamping completion time and duration on
    /// terminal states. Rejects anything the state machine forbids.
    pub fn transition(&mut self, next: RunState) -> Result<(), AppError> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "Run {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        if next.is_terminal() {
            let now = Utc::now();
            self.completed_at = Some(now);
            self.duration_ms = Some(
                (now - self.started_at).num_milliseconds().max(0) as u64,
            );
        }
        Ok(())
    }

    /// Transition to Failed, preserving the message verbatim
    pub fn fail(&mut self, message: &str) -> Result<(), AppError> {
        self.transition(RunState::Failed)?;
        self.error = Some(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> DetectionRun {
        DetectionRun::new(RunType::Manual, None, "tester")
    }

    #[test]
    fn test_happy_path_progression() {
        let mut run = new_run();
        for next in [
            RunState::Running,
            RunState::SnapshotTaken,
            RunState::Compared,
            RunState::Analyzed,
            RunState::Completed,
        ] {
            run.transition(next).unwrap();
            assert_eq!(run.state, next);
        }
        assert!(run.completed_at.is_some());
        assert!(run.duration_ms.is_some());
    }

    #[test]
    fn test_no_skipping_and_no_going_back() {
        let mut run = new_run();
        assert!(run.transition(RunState::SnapshotTaken).is_err());
        run.transition(RunState::Running).unwrap();
        assert!(run.transition(RunState::Pending).is_err());
        assert!(run.transition(RunState::Completed).is_err());
    }

    #[test]
    fn test_failed_reachable_from_any_live_state() {
        let mut run = new_run();
        run.transition(RunState::Running).unwrap();
        run.transition(RunState::SnapshotTaken).unwrap();
        run.fail("catalog query timed out").unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error.as_deref(), Some("catalog query timed out"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = new_run();
        run.transition(RunState::Cancelled).unwrap();
        assert!(run.transition(RunState::Running).is_err());
        assert!(run.transition(RunState::Failed).is_err());

        let mut run = new_run();
        run.fail("boom").unwrap();
        assert!(run.transition(RunState::Cancelled).is_err());
    }

    #[test]
    fn test_scope_reflects_schema_filter() {
        let run = DetectionRun::new(RunType::Scheduled, Some("sales".to_string()), "scheduler");
        assert_eq!(run.scope, "schema:sales");
        assert_eq!(new_run().scope, "database");
    }
}
