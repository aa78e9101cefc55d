//! Column Lineage Module
//!
//! Parses procedural SQL bodies into an AST and extracts column-level
//! data-flow facts: which physical columns a routine reads and writes, how
//! values are transformed, and whether PII is involved.

pub mod parser;
pub mod pii;
pub mod store;

pub use parser::LineageParser;
pub use pii::PiiCategory;
#[allow(unused_imports)]
pub use store::LineageStore;

use serde::{Deserialize, Serialize};

/// Operation a lineage fact describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageOperation {
    Read,
    Insert,
    Update,
    Delete,
    MergeInsert,
    MergeUpdate,
    MergeDelete,
}

impl LineageOperation {
    /// Base risk weight before the PII multiplier
    pub fn base_weight(&self) -> u32 {
        match self {
            LineageOperation::Read => 1,
            LineageOperation::Insert => 2,
            LineageOperation::MergeInsert => 2,
            LineageOperation::Update => 3,
            LineageOperation::MergeUpdate => 4,
            LineageOperation::Delete => 5,
            LineageOperation::MergeDelete => 5,
        }
    }
}

/// Wildcard column marker: the whole row flows
pub const WILDCARD_COLUMN: &str = "*";

/// One data-flow fact extracted from a procedural body.
///
/// Writes flow routine → table: the touched table/column sits in the target
/// fields. Reads flow table → routine: the read table/column sits in the
/// source fields and the routine in the target fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineageEntry {
    pub source_object: String,
    pub source_column: String,
    pub target_schema: String,
    pub target_table: String,
    pub target_column: String,
    pub operation: LineageOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    pub is_pii: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pii_category: Option<PiiCategory>,
    pub risk_weight: u32,
    pub line_start: u32,
    pub line_end: u32,
}

/// One recoverable parse problem, localized to a source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseIssue {
    pub line: u32,
    pub message: String,
}

/// Result of extracting lineage from one procedural object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageExtraction {
    pub success: bool,
    pub entries: Vec<ColumnLineageEntry>,
    pub errors: Vec<ParseIssue>,
    pub lines_analyzed: usize,
    pub elapsed_ms: u64,
}
