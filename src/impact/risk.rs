//! Risk Scoring
//!
//! Folds a change's kind, downstream impacts, schema criticality and usage
//! telemetry into a single 0-100 score, then maps the score to a risk
//! level. The score-to-level thresholds are part of the external contract.

use crate::detection::{ChangeKind, RiskLevel};
use crate::impact::{ChangeImpact, ImpactType};

/// Points contributed by the change kind itself
fn base_points(kind: ChangeKind) -> u32 {
    match kind {
        ChangeKind::Drop => 40,
        ChangeKind::Alter => 20,
        ChangeKind::Create => 5,
    }
}

/// Usage-frequency bonus by execution-count bucket
pub fn usage_bonus(execution_count: i64) -> u32 {
    match execution_count {
        i64::MIN..=0 => 0,
        1..=99 => 5,
        100..=999 => 10,
        1000..=9999 => 15,
        _ => 20,
    }
}

/// Composite risk score, clamped to 0-100
pub fn risk_score(
    kind: ChangeKind,
    impacts: &[ChangeImpact],
    schema: &str,
    critical_schemas: &[String],
    usage: u32,
) -> u32 {
    let severity_sum: u32 = impacts.iter().map(|i| i.severity as u32).sum();
    let breaks = impacts
        .iter()
        .filter(|i| i.impact_type == ImpactType::Breaks)
        .count() as u32;

    let mut score = base_points(kind)
        + 5 * impacts.len() as u32
        + 3 * severity_sum
        + 15 * breaks
        + usage;

    if critical_schemas.iter().any(|s| s.eq_ignore_ascii_case(schema)) {
        score += 10;
    }

    score.min(100)
}

/// Monotonic score-to-level mapping; boundaries are exact
pub fn level_for(score: u32) -> RiskLevel {
    match score {
        80.. => RiskLevel::Critical,
        60..=79 => RiskLevel::High,
        30..=59 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}
