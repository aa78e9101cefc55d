//! Impact Analysis Module
//!
//! "What breaks if this change ships?" Walks catalog dependency metadata to
//! find downstream objects, classifies the consequence for each, and folds
//! everything into a 0-100 risk score.

pub mod analyzer;
pub mod dependencies;
pub mod risk;

pub use analyzer::{ImpactAnalyzer, ImpactAssessment};
#[allow(unused_imports)]
pub use dependencies::{DependencyWalker, MAX_DEPENDENCY_DEPTH};

use crate::catalog::ObjectKind;
use serde::{Deserialize, Serialize};

/// Nature of a downstream consequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactType {
    Breaks,
    Invalidates,
    Modifies,
    Performance,
}

impl ImpactType {
    /// Fixed remediation advice per impact type
    pub fn suggested_action(&self) -> &'static str {
        match self {
            ImpactType::Breaks => "Review and update the dependent object before deploying",
            ImpactType::Invalidates => "Recompile the dependent object after applying the change",
            ImpactType::Modifies => "Test the dependent object against the new definition",
            ImpactType::Performance => "Review and test the dependent object thoroughly",
        }
    }
}

/// One downstream consequence of a schema change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeImpact {
    pub affected_schema: String,
    pub affected_object: String,
    pub affected_kind: ObjectKind,
    pub impact_type: ImpactType,
    /// 1 (informational) to 5 (broken)
    pub severity: u8,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    pub suggested_action: String,
    pub requires_manual_review: bool,
}

/// A downstream object reachable through lineage or catalog dependency,
/// with the traversal depth and the columns affected along the path.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageDependency {
    pub schema: String,
    pub object: String,
    pub kind: ObjectKind,
    pub depth: u32,
    pub affected_columns: Vec<String>,
}
