//! Schema descriptor for the curated dataset.
//!
//! Describes every table questions are allowed to touch. The descriptor is a
//! process-wide constant: it feeds the generation prompt and the guardrail's
//! allow-list, and is never mutated at runtime.

use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Name of the one curated table.
pub const DAILY_METRIC_TABLE: &str = "daily_metric";

/// Semantic type of a column, rendered as its SQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    /// Calendar date stored as ISO-8601 text.
    Date,
    /// Signed 64-bit integer.
    Integer,
}

impl ColumnType {
    /// Returns the SQL type name used in prompts and DDL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Date => "DATE",
            Self::Integer => "INTEGER",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A column on an allow-listed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub data_type: ColumnType,
    pub description: &'static str,
}

/// An allow-listed table with its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: Vec<Column>,
}

/// Immutable description of every table a query may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    tables: Vec<Table>,
}

impl SchemaDescriptor {
    /// Returns the process-wide descriptor of the curated dataset.
    pub fn curated() -> &'static SchemaDescriptor {
        static CURATED: OnceLock<SchemaDescriptor> = OnceLock::new();
        CURATED.get_or_init(|| SchemaDescriptor {
            tables: vec![Table {
                name: DAILY_METRIC_TABLE,
                description: "One row per calendar date holding that day's total.",
                columns: vec![
                    Column {
                        name: "date",
                        data_type: ColumnType::Date,
                        description: "Calendar day (YYYY-MM-DD), unique key.",
                    },
                    Column {
                        name: "value",
                        data_type: ColumnType::Integer,
                        description: "Non-negative count recorded for that day.",
                    },
                ],
            }],
        })
    }

    /// All allow-listed tables, in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Looks up a table by name (case-insensitive).
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Names of the allow-listed tables.
    pub fn allowed_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|t| t.name)
    }

    /// Returns true if `name` is on the allow-list.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Formats the schema for inclusion in an LLM prompt.
    pub fn format_for_llm(&self) -> String {
        self.tables
            .iter()
            .map(|table| {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| format!("  - {}: {} ({})\n", c.name, c.data_type, c.description))
                    .collect::<String>();
                format!("Table: {} -- {}\n{}", table.name, table.description, columns)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compact signature form, e.g. `daily_metric(date DATE, value INTEGER)`.
    pub fn signatures(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|table| {
                let cols = table
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", table.name, cols)
            })
            .collect()
    }
}
