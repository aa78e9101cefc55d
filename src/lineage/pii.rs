//! PII Detection Heuristics
//!
//! A column name is flagged PII when it contains any of a fixed vocabulary
//! of substrings, case-insensitively. The first matching category in
//! priority order wins. The matching is deliberately coarse ("dob" also
//! matches inside unrelated tokens) and must stay stable.

use crate::lineage::LineageOperation;
use serde::{Deserialize, Serialize};

/// Inferred category of personally identifiable information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiCategory {
    Ssn,
    Email,
    Phone,
    DateOfBirth,
    Address,
    Financial,
    Other,
}

/// Substring vocabulary in priority order: SSN/TaxId > Email > Phone >
/// DateOfBirth > Address > Financial > Other.
const VOCABULARY: &[(&str, PiiCategory)] = &[
    ("ssn", PiiCategory::Ssn),
    ("social", PiiCategory::Ssn),
    ("taxid", PiiCategory::Ssn),
    ("tax_id", PiiCategory::Ssn),
    ("email", PiiCategory::Email),
    ("phone", PiiCategory::Phone),
    ("mobile", PiiCategory::Phone),
    ("dob", PiiCategory::DateOfBirth),
    ("birth", PiiCategory::DateOfBirth),
    ("addr", PiiCategory::Address),
    ("salary", PiiCategory::Financial),
    ("income", PiiCategory::Financial),
    ("credit", PiiCategory::Financial),
    ("passport", PiiCategory::Other),
    ("license", PiiCategory::Other),
];

/// Classify a column name; `None` means not PII
pub fn classify(column_name: &str) -> Option<PiiCategory> {
    let lower = column_name.to_lowercase();
    VOCABULARY
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, category)| *category)
}

/// Risk weight for an operation on a column: base weight, doubled for PII
pub fn risk_weight(operation: LineageOperation, is_pii: bool) -> u32 {
    let base = operation.base_weight();
    if is_pii {
        base * 2
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_priority_order() {
        // "social" (SSN) outranks "email" when both match
        assert_eq!(classify("SocialEmail"), Some(PiiCategory::Ssn));
        assert_eq!(classify("EmailAddress"), Some(PiiCategory::Email));
        assert_eq!(classify("home_phone"), Some(PiiCategory::Phone));
        assert_eq!(classify("DateOfBirth"), Some(PiiCategory::DateOfBirth));
        assert_eq!(classify("StreetAddr"), Some(PiiCategory::Address));
        assert_eq!(classify("BaseSalary"), Some(PiiCategory::Financial));
        assert_eq!(classify("PassportNo"), Some(PiiCategory::Other));
        assert_eq!(classify("OrderTotal"), None);
    }

    #[test]
    fn test_matching_is_case_insensitive_and_substring_based() {
        assert_eq!(classify("CUSTOMER_SSN"), Some(PiiCategory::Ssn));
        // Coarse by contract: "dob" matches inside unrelated tokens
        assert_eq!(classify("UpdatedObject"), Some(PiiCategory::DateOfBirth));
    }

    #[test]
    fn test_pii_weight_is_exactly_double() {
        for op in [
            LineageOperation::Read,
            LineageOperation::Insert,
            LineageOperation::Update,
            LineageOperation::Delete,
            LineageOperation::MergeInsert,
            LineageOperation::MergeUpdate,
            LineageOperation::MergeDelete,
        ] {
            assert_eq!(risk_weight(op, true), 2 * risk_weight(op, false));
        }
    }

    #[test]
    fn test_base_weights() {
        assert_eq!(risk_weight(LineageOperation::Read, false), 1);
        assert_eq!(risk_weight(LineageOperation::Insert, false), 2);
        assert_eq!(risk_weight(LineageOperation::Update, false), 3);
        assert_eq!(risk_weight(LineageOperation::MergeUpdate, false), 4);
        assert_eq!(risk_weight(LineageOperation::Delete, false), 5);
        assert_eq!(risk_weight(LineageOperation::MergeDelete, false), 5);
    }
}
