//! SQL AST Parsing & Lineage Extraction
//!
//! Parses one procedural SQL body with `sqlparser` and walks the statement
//! tree to produce column-level lineage facts. Statement dispatch:
//!
//! - `INSERT` with an explicit column list: one entry per column
//! - `UPDATE`: one entry per assignment, transformation text recorded
//! - `DELETE`: a single wildcard-column entry
//! - `MERGE`: one entry per action clause; only `MERGE_UPDATE` decomposes
//!   per-assignment columns
//! - `SELECT` (including sub-selects): table aliases are registered into a
//!   per-query scope first, then every column reference that resolves
//!   through that scope yields a `READ` entry; unresolvable references are
//!   silently skipped
//!
//! The parser never executes or type-checks SQL. An unparsable body yields
//! an unsuccessful result with one line-located error and no entries.

use crate::lineage::{
    pii, ColumnLineageEntry, LineageExtraction, LineageOperation, ParseIssue, WILDCARD_COLUMN,
};
use regex::Regex;
use sqlparser::ast::{
    Assignment, AssignmentTarget, Expr, FromTable, GroupByExpr, MergeAction, ObjectName,
    ObjectNamePart, Query, Select, SelectItem, SetExpr, Spanned, Statement, TableFactor,
    TableObject, TableWithJoins,
};
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;
use std::time::Instant;

/// Extracts column lineage from procedural SQL bodies
pub struct LineageParser;

impl LineageParser {
    /// Parse `definition` (the full definition text of `schema.object`) and
    /// extract every lineage fact it contains.
    pub fn extract(schema: &str, object: &str, definition: &str) -> LineageExtraction {
        let started = Instant::now();
        let lines_analyzed = definition.lines().count();

        let body = blank_routine_header(definition);
        let statements = match Parser::parse_sql(&MsSqlDialect {}, &body) {
            Ok(statements) => statements,
            Err(e) => {
                let message = e.to_string();
                let line = parse_error_line(&message);
                tracing::debug!("Lineage parse failed for {}.{}: {}", schema, object, message);
                return LineageExtraction {
                    success: false,
                    entries: Vec::new(),
                    errors: vec![ParseIssue { line, message }],
                    lines_analyzed,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        let mut extractor = Extractor::new(schema, object);
        for statement in &statements {
            extractor.visit_statement(statement);
        }

        LineageExtraction {
            success: true,
            entries: dedup_entries(extractor.entries),
            errors: Vec::new(),
            lines_analyzed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Pull the source line out of a sqlparser error message
/// (e.g. "Expected ..., found: X at Line: 12, Column: 7")
fn parse_error_line(message: &str) -> u32 {
    let re = Regex::new(r"Line:\s*(\d+)").expect("valid line pattern");
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

/// Blank out (preserving line and column positions) the
/// `CREATE [OR ALTER] PROCEDURE|FUNCTION ... AS` header and an outermost
/// `BEGIN`/`END` pair, so a routine definition parses as a statement list.
/// Coarse word-level scan; bodies that are already plain statement lists
/// pass through untouched.
fn blank_routine_header(definition: &str) -> String {
    let words = scan_words(definition);
    if words.is_empty() {
        return definition.to_string();
    }

    let first = words[0].2.as_str();
    if first != "CREATE" && first != "ALTER" {
        return definition.to_string();
    }
    let is_routine = words
        .iter()
        .take(4)
        .any(|(_, _, w)| matches!(w.as_str(), "PROCEDURE" | "PROC" | "FUNCTION"));
    if !is_routine {
        return definition.to_string();
    }

    const BODY_STARTERS: &[&str] = &[
        "BEGIN", "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "WITH", "DECLARE", "SET",
        "IF", "RETURN",
    ];

    // First standalone AS whose follower starts the body
    let as_index = words.iter().enumerate().position(|(i, (_, _, w))| {
        w == "AS"
            && words
                .get(i + 1)
                .map(|(_, _, next)| BODY_STARTERS.contains(&next.as_str()))
                .unwrap_or(true)
    });
    let Some(as_index) = as_index else {
        return definition.to_string();
    };

    let mut chars: Vec<char> = definition.chars().collect();
    let header_end = words[as_index].1;
    blank_range(&mut chars, 0, header_end);

    // Strip an outermost BEGIN ... END wrapper when present
    if let Some((begin_start, begin_end, _)) = words
        .get(as_index + 1)
        .filter(|(_, _, w)| w == "BEGIN")
    {
        blank_range(&mut chars, *begin_start, *begin_end);
        if let Some((end_start, end_end, _)) = words.iter().rev().find(|(_, _, w)| w == "END") {
            blank_range(&mut chars, *end_start, *end_end);
        }
    }

    chars.into_iter().collect()
}

/// (start, end, uppercased word) for every identifier-like token
fn scan_words(text: &str) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut words = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '@' || chars[i] == '#' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '@' || chars[i] == '#')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            words.push((start, i, word.to_uppercase()));
        } else {
            i += 1;
        }
    }
    words
}

fn blank_range(chars: &mut [char], start: usize, end: usize) {
    for c in chars.iter_mut().take(end).skip(start) {
        if *c != '\n' && *c != '\r' {
            *c = ' ';
        }
    }
}

fn dedup_entries(entries: Vec<ColumnLineageEntry>) -> Vec<ColumnLineageEntry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|e| {
            seen.insert((
                e.source_object.clone(),
                e.source_column.clone(),
                e.target_schema.clone(),
                e.target_table.clone(),
                e.target_column.clone(),
                e.operation,
                e.transformation.clone(),
            ))
        })
        .collect()
}

/// Table aliases visible inside one query. Built per SELECT and passed into
/// nested traversals explicitly, so sub-selects get correctly nested scopes
/// and the extractor stays reentrant.
#[derive(Default)]
struct AliasScope {
    /// lowercase alias or bare table name -> (schema, table)
    aliases: HashMap<String, (Option<String>, String)>,
    /// distinct physical tables in registration order
    tables: Vec<(Option<String>, String)>,
}

impl AliasScope {
    fn register(&mut self, schema: Option<String>, table: String, alias: Option<String>) {
        let entry = (schema, table.clone());
        if !self.tables.contains(&entry) {
            self.tables.push(entry.clone());
        }
        if let Some(alias) = alias {
            self.aliases.insert(alias.to_lowercase(), entry.clone());
        }
        self.aliases.insert(table.to_lowercase(), entry);
    }

    fn resolve(&self, qualifier: &str) -> Option<&(Option<String>, String)> {
        self.aliases.get(&qualifier.to_lowercase())
    }

    /// The only table in scope, when unambiguous
    fn sole_table(&self) -> Option<&(Option<String>, String)> {
        if self.tables.len() == 1 {
            self.tables.first()
        } else {
            None
        }
    }
}

struct Extractor<'a> {
    schema: &'a str,
    object: &'a str,
    routine: String,
    entries: Vec<ColumnLineageEntry>,
    current_lines: (u32, u32),
}

impl<'a> Extractor<'a> {
    fn new(schema: &'a str, object: &'a str) -> Self {
        Self {
            schema,
            object,
            routine: format!("{}.{}", schema, object),
            entries: Vec::new(),
            current_lines: (1, 1),
        }
    }

    fn visit_statement(&mut self, statement: &Statement) {
        let span = statement.span();
        self.current_lines = (
            span.start.line.max(1) as u32,
            span.end.line.max(1) as u32,
        );

        match statement {
            Statement::Insert(insert) => {
                let TableObject::TableName(name) = &insert.table else {
                    return;
                };
                let (schema, table) = split_object_name(name);
                if insert.columns.is_empty() {
                    self.emit_write(
                        LineageOperation::Insert,
                        schema.as_deref(),
                        &table,
                        WILDCARD_COLUMN,
                        None,
                    );
                } else {
                    for column in &insert.columns {
                        self.emit_write(
                            LineageOperation::Insert,
                            schema.as_deref(),
                            &table,
                            &column.value,
                            None,
                        );
                    }
                }
                if let Some(source) = &insert.source {
                    self.visit_query(source);
                }
            }
            Statement::Update(update) => {
                let table = &update.table;
                let assignments = &update.assignments;
                let Some((schema, target_table)) = factor_table_name(&table.relation) else {
                    return;
                };
                for assignment in assignments {
                    self.emit_assignment(
                        LineageOperation::Update,
                        schema.as_deref(),
                        &target_table,
                        assignment,
                    );
                }
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) => tables,
                    FromTable::WithoutKeyword(tables) => tables,
                };
                let Some((schema, table)) = tables.first().and_then(|t| factor_table_name(&t.relation))
                else {
                    return;
                };
                self.emit_write(
                    LineageOperation::Delete,
                    schema.as_deref(),
                    &table,
                    WILDCARD_COLUMN,
                    None,
                );
            }
            Statement::Merge { table, clauses, .. } => {
                let Some((schema, target_table)) = factor_table_name(table) else {
                    return;
                };
                for clause in clauses {
                    match &clause.action {
                        MergeAction::Insert(_) => {
                            self.emit_write(
                                LineageOperation::MergeInsert,
                                schema.as_deref(),
                                &target_table,
                                WILDCARD_COLUMN,
                                None,
                            );
                        }
                        MergeAction::Update { assignments, .. } => {
                            for assignment in assignments {
                                self.emit_assignment(
                                    LineageOperation::MergeUpdate,
                                    schema.as_deref(),
                                    &target_table,
                                    assignment,
                                );
                            }
                        }
                        MergeAction::Delete { .. } => {
                            self.emit_write(
                                LineageOperation::MergeDelete,
                                schema.as_deref(),
                                &target_table,
                                WILDCARD_COLUMN,
                                None,
                            );
                        }
                    }
                }
            }
            Statement::Query(query) => self.visit_query(query),
            _ => {}
        }
    }

    fn visit_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.visit_query(&cte.query);
            }
        }
        self.visit_set_expr(&query.body);
    }

    fn visit_set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::Query(inner) => self.visit_query(inner),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }

    fn visit_select(&mut self, select: &Select) {
        // Register every table reference first so later column references
        // resolve against the complete scope
        let mut scope = AliasScope::default();
        for table_with_joins in &select.from {
            self.register_table_with_joins(&mut scope, table_with_joins);
        }

        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => self.collect_reads(expr, &scope),
                SelectItem::ExprWithAlias { expr, .. } => self.collect_reads(expr, &scope),
                _ => {}
            }
        }
        if let Some(selection) = &select.selection {
            self.collect_reads(selection, &scope);
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.collect_reads(expr, &scope);
            }
        }
        if let Some(having) = &select.having {
            self.collect_reads(having, &scope);
        }
    }

    fn register_table_with_joins(&mut self, scope: &mut AliasScope, twj: &TableWithJoins) {
        self.register_factor(scope, &twj.relation);
        for join in &twj.joins {
            self.register_factor(scope, &join.relation);
        }
    }

    fn register_factor(&mut self, scope: &mut AliasScope, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let (schema, table) = split_object_name(name);
                let alias = alias.as_ref().map(|a| a.name.value.clone());
                scope.register(schema, table, alias);
            }
            // Derived tables are whole queries with their own scope
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.register_table_with_joins(scope, table_with_joins),
            _ => {}
        }
    }

    fn collect_reads(&mut self, expr: &Expr, scope: &AliasScope) {
        match expr {
            Expr::Identifier(ident) => {
                if ident.value.starts_with('@') {
                    return;
                }
                if let Some((schema, table)) = scope.sole_table().cloned() {
                    self.emit_read(schema.as_deref(), &table, &ident.value);
                }
            }
            Expr::CompoundIdentifier(idents) => {
                if idents.len() < 2 {
                    return;
                }
                let column = &idents[idents.len() - 1].value;
                let qualifier = &idents[idents.len() - 2].value;
                if qualifier.starts_with('@') {
                    return;
                }
                // Only references that resolve through the scope count;
                // anything else lacks context and is skipped
                if let Some((schema, table)) = scope.resolve(qualifier).cloned() {
                    self.emit_read(schema.as_deref(), &table, column);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                self.collect_reads(left, scope);
                self.collect_reads(right, scope);
            }
            Expr::UnaryOp { expr, .. } => self.collect_reads(expr, scope),
            Expr::Nested(inner) => self.collect_reads(inner, scope),
            Expr::Cast { expr, .. } => self.collect_reads(expr, scope),
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => self.collect_reads(inner, scope),
            Expr::Between {
                expr, low, high, ..
            } => {
                self.collect_reads(expr, scope);
                self.collect_reads(low, scope);
                self.collect_reads(high, scope);
            }
            Expr::InList { expr, list, .. } => {
                self.collect_reads(expr, scope);
                for item in list {
                    self.collect_reads(item, scope);
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.collect_reads(expr, scope);
                self.visit_query(subquery);
            }
            Expr::Subquery(query) => self.visit_query(query),
            Expr::Function(function) => {
                use sqlparser::ast::{FunctionArg, FunctionArgExpr, FunctionArguments};
                if let FunctionArguments::List(list) = &function.args {
                    for arg in &list.args {
                        match arg {
                            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                                self.collect_reads(e, scope)
                            }
                            FunctionArg::Named { arg, .. } | FunctionArg::ExprNamed { arg, .. } => {
                                if let FunctionArgExpr::Expr(e) = arg {
                                    self.collect_reads(e, scope)
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn emit_assignment(
        &mut self,
        operation: LineageOperation,
        schema: Option<&str>,
        table: &str,
        assignment: &Assignment,
    ) {
        let transformation = Some(assignment.value.to_string());
        match &assignment.target {
            AssignmentTarget::ColumnName(name) => {
                let (_, column) = split_object_name(name);
                self.emit_write(operation, schema, table, &column, transformation);
            }
            AssignmentTarget::Tuple(names) => {
                for name in names {
                    let (_, column) = split_object_name(name);
                    self.emit_write(operation, schema, table, &column, transformation.clone());
                }
            }
        }
    }

    /// Write-side fact: routine → table.column
    fn emit_write(
        &mut self,
        operation: LineageOperation,
        schema: Option<&str>,
        table: &str,
        column: &str,
        transformation: Option<String>,
    ) {
        let pii_category = pii::classify(column);
        let is_pii = pii_category.is_some();
        self.entries.push(ColumnLineageEntry {
            source_object: self.routine.clone(),
            source_column: WILDCARD_COLUMN.to_string(),
            target_schema: schema.unwrap_or(self.schema).to_string(),
            target_table: table.to_string(),
            target_column: column.to_string(),
            operation,
            transformation,
            is_pii,
            pii_category,
            risk_weight: pii::risk_weight(operation, is_pii),
            line_start: self.current_lines.0,
            line_end: self.current_lines.1,
        });
    }

    /// Read-side fact: table.column → routine
    fn emit_read(&mut self, schema: Option<&str>, table: &str, column: &str) {
        let pii_category = pii::classify(column);
        let is_pii = pii_category.is_some();
        self.entries.push(ColumnLineageEntry {
            source_object: format!("{}.{}", schema.unwrap_or(self.schema), table),
            source_column: column.to_string(),
            target_schema: self.schema.to_string(),
            target_table: self.object.to_string(),
            target_column: WILDCARD_COLUMN.to_string(),
            operation: LineageOperation::Read,
            transformation: None,
            is_pii,
            pii_category,
            risk_weight: pii::risk_weight(LineageOperation::Read, is_pii),
            line_start: self.current_lines.0,
            line_end: self.current_lines.1,
        });
    }
}

/// Split a possibly-qualified object name into (schema, object)
fn split_object_name(name: &ObjectName) -> (Option<String>, String) {
    let parts: Vec<String> = name
        .0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            other => other.to_string(),
        })
        .collect();
    match parts.len() {
        0 => (None, String::new()),
        1 => (None, parts[0].clone()),
        n => (Some(parts[n - 2].clone()), parts[n - 1].clone()),
    }
}

/// Physical table behind a FROM/MERGE table factor, when it is one
fn factor_table_name(factor: &TableFactor) -> Option<(Option<String>, String)> {
    match factor {
        TableFactor::Table { name, .. } => Some(split_object_name(name)),
        _ => None,
    }
}
