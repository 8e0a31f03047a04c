//! Data and result types for the embedded store.
//!
//! Defines the curated row type and the structures used to represent query
//! results coming back from the engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One day of the curated time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DailyMetric {
    /// Calendar day, unique within a dataset.
    pub date: NaiveDate,
    /// Count recorded for that day.
    pub value: u64,
}

impl DailyMetric {
    pub fn new(date: NaiveDate, value: u64) -> Self {
        Self { date, value }
    }
}

/// Where the current dataset came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// No data has been loaded, or the dataset was reset.
    Empty,
    /// Produced by the synthetic generator.
    Synthetic { days: u32, seed: u64 },
    /// Produced by an ingestion collaborator.
    Ingested { path: String },
}

impl DataSource {
    /// Returns the source type as stored in the bookkeeping table.
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Synthetic { .. } => "synthetic",
            Self::Ingested { .. } => "ingested",
        }
    }

    /// Returns the stored source detail (path or generator parameters).
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Synthetic { days, seed } => Some(format!("days={days} seed={seed}")),
            Self::Ingested { path } => Some(path.clone()),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.source_type(), detail),
            None => f.write_str(self.source_type()),
        }
    }
}

/// Snapshot of what the store currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub row_count: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub source_type: Option<String>,
    pub source_detail: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DatasetStatus {
    /// Returns true if the curated table holds at least one row.
    pub fn has_data(&self) -> bool {
        self.row_count > 0
    }
}

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data, in engine order.
    pub rows: Vec<Row>,

    /// Time taken to execute the query.
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,

    /// Number of rows in the result (may be truncated).
    pub row_count: usize,

    /// Total number of rows before truncation (if known).
    pub total_rows: Option<usize>,

    /// Whether the result was truncated due to exceeding MAX_ROWS.
    #[serde(default)]
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            row_count,
            total_rows: Some(row_count),
            was_truncated: false,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the index of the named column (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns the single value of a one-row result in the named column.
    pub fn scalar(&self, column: &str) -> Option<&Value> {
        if self.rows.len() != 1 {
            return None;
        }
        let idx = self.column_index(column)?;
        self.rows[0].get(idx)
    }

    /// Returns a truncation warning message if the result was truncated.
    pub fn truncation_warning(&self) -> Option<String> {
        if self.was_truncated {
            let total = self.total_rows.unwrap_or(self.row_count);
            Some(format!(
                "Result truncated: showing {} of {} rows",
                self.row_count, total
            ))
        } else {
            None
        }
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Declared type, or the storage class of the first value when undeclared.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a query, by SQLite storage class.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.0}")
                } else {
                    format!("{f:.2}")
                }
            }
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Serde support for Duration as nanoseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.715).to_display_string(), "2.71");
        assert_eq!(Value::Float(7200.0).to_display_string(), "7200");
        assert_eq!(Value::from("hello").to_display_string(), "hello");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_display_string(), "<3 bytes>");
    }

    #[test]
    fn test_value_numeric_accessors() {
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::Float(1.5).as_i64(), None);
        assert_eq!(Value::from("7").as_f64(), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(42i64)), Value::Int(42));
    }

    #[test]
    fn test_scalar_requires_single_row() {
        let columns = vec![ColumnInfo::new("answer", "INTEGER")];
        let single = QueryResult::with_data(columns.clone(), vec![vec![Value::Int(10)]]);
        assert_eq!(single.scalar("ANSWER"), Some(&Value::Int(10)));

        let double =
            QueryResult::with_data(columns, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert_eq!(double.scalar("answer"), None);
    }

    #[test]
    fn test_truncation_warning() {
        let mut result = QueryResult::with_data(vec![], vec![vec![]; 3]);
        assert!(result.truncation_warning().is_none());
        result.was_truncated = true;
        result.total_rows = Some(5000);
        assert_eq!(
            result.truncation_warning().unwrap(),
            "Result truncated: showing 3 of 5000 rows"
        );
    }

    #[test]
    fn test_data_source_display() {
        assert_eq!(DataSource::Empty.to_string(), "empty");
        assert_eq!(
            DataSource::Synthetic { days: 30, seed: 7 }.to_string(),
            "synthetic (days=30 seed=7)"
        );
        assert_eq!(
            DataSource::Ingested {
                path: "/tmp/export.xml".into()
            }
            .source_type(),
            "ingested"
        );
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::Int(3), Value::Null, Value::from("x")])
            .unwrap();
        assert_eq!(json, "[3,null,\"x\"]");
    }
}
