//! Dependency Traversal
//!
//! Forward dependency lookup unions two independent catalog sources:
//! expression-level dependencies (who references this object in their
//! definition) and foreign keys (who points at this table). The downstream
//! closure expands those edges breadth-first with a visited set and a hard
//! depth cap; recursive catalog queries are never assumed.

use crate::catalog::{CatalogReader, DependentObject};
use crate::error::AppError;
use crate::impact::LineageDependency;
use std::collections::{HashSet, VecDeque};

/// Maximum hops followed when expanding downstream dependencies
pub const MAX_DEPENDENCY_DEPTH: u32 = 5;

pub struct DependencyWalker;

impl DependencyWalker {
    /// Direct dependents of one object: expression dependencies unioned
    /// with foreign-key dependents, de-duplicated by `schema.object`.
    pub async fn direct_dependents<C: CatalogReader>(
        catalog: &C,
        schema: &str,
        object: &str,
        column: Option<&str>,
    ) -> Result<Vec<DependentObject>, AppError> {
        let mut seen = HashSet::new();
        let mut dependents = Vec::new();

        for dep in catalog.expression_dependents(schema, object, column).await? {
            if seen.insert(dep.qualified_name()) {
                dependents.push(dep);
            }
        }
        for dep in catalog.foreign_key_dependents(schema, object).await? {
            if seen.insert(dep.qualified_name()) {
                dependents.push(dep);
            }
        }

        Ok(dependents)
    }

    /// Downstream closure from one object, breadth-first up to
    /// [`MAX_DEPENDENCY_DEPTH`] hops. Each discovered dependency carries the
    /// union of columns affected along its path. Expansion stops early once
    /// a frontier discovers nothing new.
    pub async fn downstream_closure<C: CatalogReader>(
        catalog: &C,
        schema: &str,
        object: &str,
        column: Option<&str>,
    ) -> Result<Vec<LineageDependency>, AppError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(format!("{}.{}", schema, object));

        let mut results = Vec::new();
        let mut queue: VecDeque<(String, String, u32, Vec<String>)> = VecDeque::new();
        queue.push_back((
            schema.to_string(),
            object.to_string(),
            0,
            column.map(|c| vec![c.to_string()]).unwrap_or_default(),
        ));

        while let Some((dep_schema, dep_object, depth, path_columns)) = queue.pop_front() {
            if depth >= MAX_DEPENDENCY_DEPTH {
                continue;
            }
            // The column filter only narrows the first hop; beyond it the
            // dependency is object-level
            let hop_column = if depth == 0 { column } else { None };
            let direct =
                Self::direct_dependents(catalog, &dep_schema, &dep_object, hop_column).await?;

            for dep in direct {
                if !visited.insert(dep.qualified_name()) {
                    continue;
                }
                let mut columns = path_columns.clone();
                if let Some(via) = &dep.via_column {
                    if !columns.contains(via) {
                        columns.push(via.clone());
                    }
                }
                results.push(LineageDependency {
                    schema: dep.schema.clone(),
                    object: dep.name.clone(),
                    kind: dep.kind,
                    depth: depth + 1,
                    affected_columns: columns.clone(),
                });
                queue.push_back((dep.schema, dep.name, depth + 1, columns));
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::catalog::ObjectKind;

    /// A -> B -> C -> D -> E -> F -> G expression-dependency chain
    fn chain_catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::default();
        let names = ["A", "B", "C", "D", "E", "F", "G"];
        for window in names.windows(2) {
            catalog.expression_deps.insert(
                format!("dbo.{}", window[0]),
                vec![MemoryCatalog::dependent("dbo", window[1], ObjectKind::View)],
            );
        }
        catalog
    }

    #[tokio::test]
    async fn test_closure_stops_at_depth_five() {
        let catalog = chain_catalog();
        let deps = DependencyWalker::downstream_closure(&catalog, "dbo", "A", None)
            .await
            .unwrap();

        let names: Vec<&str> = deps.iter().map(|d| d.object.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "D", "E", "F"]);
        assert_eq!(deps.last().unwrap().depth, 5);
        assert!(!names.contains(&"G"));
    }

    #[tokio::test]
    async fn test_direct_dependents_union_is_deduplicated() {
        let mut catalog = MemoryCatalog::default();
        catalog.expression_deps.insert(
            "dbo.Customers".to_string(),
            vec![
                MemoryCatalog::dependent("dbo", "GetCustomer", ObjectKind::Procedure),
                MemoryCatalog::dependent("dbo", "Orders", ObjectKind::Table),
            ],
        );
        catalog.fk_deps.insert(
            "dbo.Customers".to_string(),
            vec![DependentObject {
                schema: "dbo".to_string(),
                name: "Orders".to_string(),
                kind: ObjectKind::Table,
                via_column: Some("CustomerId".to_string()),
            }],
        );

        let deps = DependencyWalker::direct_dependents(&catalog, "dbo", "Customers", None)
            .await
            .unwrap();
        assert_eq!(deps.len(), 2);
    }

    #[tokio::test]
    async fn test_closure_accumulates_columns_along_path() {
        let mut catalog = MemoryCatalog::default();
        catalog.fk_deps.insert(
            "dbo.Customers".to_string(),
            vec![DependentObject {
                schema: "dbo".to_string(),
                name: "Orders".to_string(),
                kind: ObjectKind::Table,
                via_column: Some("CustomerId".to_string()),
            }],
        );

        let deps = DependencyWalker::downstream_closure(&catalog, "dbo", "Customers", Some("Id"))
            .await
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(
            deps[0].affected_columns,
            vec!["Id".to_string(), "CustomerId".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let mut catalog = MemoryCatalog::default();
        catalog.expression_deps.insert(
            "dbo.A".to_string(),
            vec![MemoryCatalog::dependent("dbo", "B", ObjectKind::View)],
        );
        catalog.expression_deps.insert(
            "dbo.B".to_string(),
            vec![MemoryCatalog::dependent("dbo", "A", ObjectKind::View)],
        );

        let deps = DependencyWalker::downstream_closure(&catalog, "dbo", "A", None)
            .await
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].object, "B");
    }
}
