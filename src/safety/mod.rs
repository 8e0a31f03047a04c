//! Guardrail validation for generated SQL.
//!
//! Every candidate query passes through [`SqlGuard`] before it can reach the
//! store. The guard either hands back an [`AcceptedQuery`] (the only type the
//! executor will run) or a [`RejectReason`] naming the first rule violated.

mod guard;
mod lexer;
mod parser;

pub use guard::{validate_sql, SqlGuard, FORBIDDEN_KEYWORDS};

use serde::Serialize;
use std::fmt;

/// Why a candidate query was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The statement is not a read-only query (SELECT or WITH … SELECT).
    NotSelectOnly,
    /// More than one statement was supplied.
    MultipleStatements,
    /// A relation outside the allow-list is referenced.
    TableNotAllowed,
    /// A deny-listed keyword appears, even inside a comment.
    ForbiddenKeyword,
}

impl RejectReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotSelectOnly => "not_select_only",
            Self::MultipleStatements => "multiple_statements",
            Self::TableNotAllowed => "table_not_allowed",
            Self::ForbiddenKeyword => "forbidden_keyword",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSelectOnly => write!(f, "only SELECT queries are allowed"),
            Self::MultipleStatements => write!(f, "multiple statements are not allowed"),
            Self::TableNotAllowed => write!(f, "query references a table that is not allowed"),
            Self::ForbiddenKeyword => write!(f, "query contains a forbidden keyword"),
        }
    }
}

/// A query that passed every guard rule.
///
/// Only the guard can construct one, so holding an `AcceptedQuery` is proof
/// that the text was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedQuery {
    sql: String,
}

impl AcceptedQuery {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// The validated SQL text, unchanged.
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for AcceptedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Outcome of validating a candidate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(AcceptedQuery),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Returns the rejection reason, if any.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }

    /// Converts into a `Result`, treating rejection as the error.
    pub fn into_result(self) -> std::result::Result<AcceptedQuery, RejectReason> {
        match self {
            Self::Accepted(query) => Ok(query),
            Self::Rejected(reason) => Err(reason),
        }
    }
}
