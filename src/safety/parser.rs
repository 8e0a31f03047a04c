//! Structural SQL analysis.
//!
//! Uses sqlparser-rs with the SQLite dialect to count statements, confirm the
//! statement is a pure query, and collect every relation it reads. The guard
//! combines this with its lexical checks; input the parser cannot handle is
//! left to the lexical rules alone.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// What the parser learned about a SQL string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    pub statement_count: usize,
    /// True when the first statement is a query with no data-modifying parts.
    pub first_is_query: bool,
    /// Relation names read anywhere in the text, lowercased, schema dropped.
    /// References to a CTE in scope are already resolved and left out.
    pub relations: Vec<String>,
}

/// Parses `sql`, returning `None` when the dialect parser rejects it.
pub fn analyze(sql: &str) -> Option<Structure> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).ok()?;

    let mut collector = RelationCollector::default();
    for stmt in &statements {
        let _ = stmt.visit(&mut collector);
    }

    Some(Structure {
        statement_count: statements.len(),
        first_is_query: statements.first().is_some_and(is_pure_query),
        relations: collector.relations,
    })
}

#[derive(Default)]
struct RelationCollector {
    relations: Vec<String>,
    /// CTE names bound by each enclosing query, innermost last.
    scopes: Vec<HashSet<String>>,
}

impl RelationCollector {
    fn in_scope(&self, name: &str) -> bool {
        self.scopes.iter().any(|names| names.contains(name))
    }
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        let names = query
            .with
            .iter()
            .flat_map(|with| &with.cte_tables)
            .map(|cte| cte.alias.name.value.to_lowercase())
            .collect();
        self.scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(last) = relation.0.last() {
            let name = last.value.to_lowercase();
            // A qualified name always means a real table.
            if relation.0.len() > 1 || !self.in_scope(&name) {
                self.relations.push(name);
            }
        }
        ControlFlow::Continue(())
    }
}

fn is_pure_query(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => query_is_read_only(query),
        _ => false,
    }
}

/// Recursively checks CTE bodies and set operations for data modification.
fn query_is_read_only(query: &Query) -> bool {
    let ctes_ok = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| query_is_read_only(&cte.query)));

    ctes_ok && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(set_expr: &SetExpr) -> bool {
    match set_expr {
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => true,
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        // INSERT, UPDATE and friends embedded in a query body
        _ => false,
    }
}
