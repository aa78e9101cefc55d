//! Detection Module
//!
//! Typed change records and the run machinery that produces them:
//! - `SchemaChange`: one detected structural delta with its analysis results
//! - `DetectionRun`: the state-machine record for one capture→diff→analyze pass
//! - `DetectionOrchestrator`: sequences the whole pipeline per run

pub mod orchestrator;
pub mod run;
pub mod store;

pub use orchestrator::DetectionOrchestrator;
pub use run::{DetectionRun, RunState, RunType};
#[allow(unused_imports)]
pub use store::{ChangeStore, RunStore};

use crate::catalog::{CatalogObject, ObjectKind};
use crate::error::AppError;
use crate::impact::ChangeImpact;
use crate::lineage::ColumnLineageEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of structural delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Create,
    Alter,
    Drop,
}

/// Risk classification derived from the impact score.
/// Variant order is the severity order; comparisons rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Processing lifecycle of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingStatus {
    Pending,
    Acknowledged,
    AutoProcessed,
}

/// One detected structural change with its analysis results attached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChange {
    pub id: Uuid,
    pub database: String,
    pub schema: String,
    pub object: String,
    pub object_kind: ObjectKind,
    pub change_kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_definition: Option<String>,
    /// Raw DDL when a capture source provides it (diff-based detection does not)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_ddl: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub detected_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub impact_score: u32,
    pub risk_level: RiskLevel,
    pub status: ProcessingStatus,
    pub approval_required: bool,
    /// External workflow references, identifiers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<Uuid>,
    pub impacts: Vec<ChangeImpact>,
    pub column_changes: Vec<ColumnLineageEntry>,
}

impl SchemaChange {
    fn base(
        database: &str,
        schema: &str,
        object: &str,
        object_kind: ObjectKind,
        change_kind: ChangeKind,
        detected_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            database: database.to_string(),
            schema: schema.to_string(),
            object: object.to_string(),
            object_kind,
            change_kind,
            old_definition: None,
            new_definition: None,
            raw_ddl: None,
            detected_at: Utc::now(),
            detected_by: detected_by.to_string(),
            host: None,
            application: None,
            impact_score: 0,
            risk_level: RiskLevel::Low,
            status: ProcessingStatus::Pending,
            approval_required: false,
            approval_ref: None,
            document_ref: None,
            impacts: Vec::new(),
            column_changes: Vec::new(),
        }
    }

    /// Object only present in the current snapshot
    pub fn created(database: &str, object: &CatalogObject, detected_by: &str) -> Self {
        let mut change = Self::base(
            database,
            &object.schema,
            &object.name,
            object.kind,
            ChangeKind::Create,
            detected_by,
        );
        change.new_definition = Some(object.definition.clone());
        change
    }

    /// Object only present in the baseline snapshot
    pub fn dropped(database: &str, object: &CatalogObject, detected_by: &str) -> Self {
        let mut change = Self::base(
            database,
            &object.schema,
            &object.name,
            object.kind,
            ChangeKind::Drop,
            detected_by,
        );
        change.old_definition = Some(object.definition.clone());
        change
    }

    /// Object present in both snapshots with differing definitions
    pub fn altered(
        database: &str,
        old: &CatalogObject,
        new: &CatalogObject,
        detected_by: &str,
    ) -> Self {
        let mut change = Self::base(
            database,
            &new.schema,
            &new.name,
            new.kind,
            ChangeKind::Alter,
            detected_by,
        );
        change.old_definition = Some(old.definition.clone());
        change.new_definition = Some(new.definition.clone());
        change
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.object)
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }

    /// Mark the change as acknowledged. Only pending changes can move.
    pub fn acknowledge(&mut self) -> Result<(), AppError> {
        match self.status {
            ProcessingStatus::Pending => {
                self.status = ProcessingStatus::Acknowledged;
                Ok(())
            }
            _ => Err(AppError::Conflict(format!(
                "Change {} is not pending (status {:?})",
                self.id, self.status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;

    #[test]
    fn test_change_kind_matches_definition_pair() {
        let obj = MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id integer");

        let created = SchemaChange::created("appdb", &obj, "tester");
        assert!(created.old_definition.is_none());
        assert!(created.new_definition.is_some());

        let dropped = SchemaChange::dropped("appdb", &obj, "tester");
        assert!(dropped.old_definition.is_some());
        assert!(dropped.new_definition.is_none());

        let new = MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id bigint");
        let altered = SchemaChange::altered("appdb", &obj, &new, "tester");
        assert!(altered.old_definition.is_some());
        assert!(altered.new_definition.is_some());
        assert_ne!(altered.old_definition, altered.new_definition);
    }

    #[test]
    fn test_acknowledge_only_from_pending() {
        let obj = MemoryCatalog::object("dbo", "T1", ObjectKind::Table, "Id integer");
        let mut change = SchemaChange::created("appdb", &obj, "tester");

        assert!(change.acknowledge().is_ok());
        assert_eq!(change.status, ProcessingStatus::Acknowledged);
        assert!(change.acknowledge().is_err());
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }
}
