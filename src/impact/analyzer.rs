//! Impact Analyzer
//!
//! For one detected change: find direct dependents, classify what the
//! change does to each of them, and compute the composite risk score.
//! Telemetry failures degrade the usage bonus to zero; they never fail the
//! analysis.

use crate::catalog::{CatalogReader, DependentObject};
use crate::detection::{ChangeKind, RiskLevel, SchemaChange};
use crate::error::AppError;
use crate::impact::{dependencies::DependencyWalker, risk, ChangeImpact, ImpactType};
use tracing::warn;

/// Outcome of analyzing one change
#[derive(Debug, Clone)]
pub struct ImpactAssessment {
    pub impacts: Vec<ChangeImpact>,
    pub score: u32,
    pub level: RiskLevel,
}

pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub async fn analyze<C: CatalogReader>(
        catalog: &C,
        change: &SchemaChange,
        critical_schemas: &[String],
    ) -> Result<ImpactAssessment, AppError> {
        let dependents =
            DependencyWalker::direct_dependents(catalog, &change.schema, &change.object, None)
                .await?;

        let impacts: Vec<ChangeImpact> = dependents
            .iter()
            .map(|dep| Self::classify(change, dep))
            .collect();

        let usage = match catalog.execution_count(&change.schema, &change.object).await {
            Ok(count) => risk::usage_bonus(count),
            Err(e) => {
                warn!(
                    "Usage telemetry unavailable for {} ({}); scoring without usage bonus",
                    change.qualified_name(),
                    e
                );
                0
            }
        };

        let score = risk::risk_score(
            change.change_kind,
            &impacts,
            &change.schema,
            critical_schemas,
            usage,
        );
        let level = risk::level_for(score);

        Ok(ImpactAssessment {
            impacts,
            score,
            level,
        })
    }

    /// Classify what the originating change does to one direct dependent
    fn classify(change: &SchemaChange, dependent: &DependentObject) -> ChangeImpact {
        let source = change.qualified_name();
        let (impact_type, severity, description) = match change.change_kind {
            ChangeKind::Drop => (
                ImpactType::Breaks,
                5,
                format!(
                    "{} {} references dropped object {}",
                    dependent.kind,
                    dependent.qualified_name(),
                    source
                ),
            ),
            ChangeKind::Alter => (
                ImpactType::Invalidates,
                3,
                format!(
                    "{} {} may need recompilation after {} is altered",
                    dependent.kind,
                    dependent.qualified_name(),
                    source
                ),
            ),
            ChangeKind::Create => (
                ImpactType::Modifies,
                1,
                format!(
                    "{} {} may reference new object {}",
                    dependent.kind,
                    dependent.qualified_name(),
                    source
                ),
            ),
        };

        ChangeImpact {
            affected_schema: dependent.schema.clone(),
            affected_object: dependent.name.clone(),
            affected_kind: dependent.kind,
            impact_type,
            severity,
            description,
            operation_type: None,
            affected_column: dependent.via_column.clone(),
            line: None,
            fragment: None,
            suggested_action: impact_type.suggested_action().to_string(),
            requires_manual_review: impact_type == ImpactType::Breaks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;

    fn drop_change() -> SchemaChange {
        let obj = MemoryCatalog::object("dbo", "Customers", ObjectKind::Table, "Id integer");
        SchemaChange::dropped("appdb", &obj, "tester")
    }

    #[tokio::test]
    async fn test_drop_with_dependent_procedure_scores_high() {
        let mut catalog = MemoryCatalog::default();
        catalog.expression_deps.insert(
            "dbo.Customers".to_string(),
            vec![MemoryCatalog::dependent("dbo", "GetCustomer", ObjectKind::Procedure)],
        );

        let change = drop_change();
        let assessment = ImpactAnalyzer::analyze(&catalog, &change, &[]).await.unwrap();

        assert_eq!(assessment.impacts.len(), 1);
        let impact = &assessment.impacts[0];
        assert_eq!(impact.impact_type, ImpactType::Breaks);
        assert_eq!(impact.severity, 5);
        assert!(impact.description.contains("dbo.Customers"));
        assert!(impact.requires_manual_review);

        assert!(assessment.score >= 60);
        assert!(assessment.level >= RiskLevel::High);
    }

    #[tokio::test]
    async fn test_alter_classifies_as_invalidates() {
        let mut catalog = MemoryCatalog::default();
        catalog.expression_deps.insert(
            "dbo.Orders".to_string(),
            vec![MemoryCatalog::dependent("dbo", "OrderSummary", ObjectKind::View)],
        );

        let old = MemoryCatalog::object("dbo", "Orders", ObjectKind::Table, "Id integer");
        let new = MemoryCatalog::object("dbo", "Orders", ObjectKind::Table, "Id bigint");
        let change = SchemaChange::altered("appdb", &old, &new, "tester");

        let assessment = ImpactAnalyzer::analyze(&catalog, &change, &[]).await.unwrap();
        assert_eq!(assessment.impacts[0].impact_type, ImpactType::Invalidates);
        assert_eq!(assessment.impacts[0].severity, 3);
        assert!(!assessment.impacts[0].requires_manual_review);
    }

    #[tokio::test]
    async fn test_telemetry_failure_degrades_to_zero_bonus() {
        let mut catalog = MemoryCatalog::default();
        catalog.telemetry_down = true;

        let change = drop_change();
        let assessment = ImpactAnalyzer::analyze(&catalog, &change, &[]).await.unwrap();
        // No dependents, no usage bonus: bare drop base points
        assert_eq!(assessment.score, 40);
        assert_eq!(assessment.level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_usage_bonus_feeds_score() {
        let mut catalog = MemoryCatalog::default();
        catalog.exec_counts.insert("dbo.Customers".to_string(), 50_000);

        let change = drop_change();
        let assessment = ImpactAnalyzer::analyze(&catalog, &change, &[]).await.unwrap();
        assert_eq!(assessment.score, 60);
        assert_eq!(assessment.level, RiskLevel::High);
    }
}
