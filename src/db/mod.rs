//! Embedded store layer for Tally.
//!
//! Provides a trait-based interface for query execution so the pipeline can
//! run against the SQLite store or an injected fake.

mod dummy;
mod schema;
mod sqlite;
mod types;

pub use dummy::{generate_daily_metrics, DummyConfig, MAX_DAYS};
pub use schema::{Column, ColumnType, SchemaDescriptor, Table, DAILY_METRIC_TABLE};
pub use sqlite::{MetricStore, DEFAULT_QUERY_TIMEOUT_SECS};
pub use types::{ColumnInfo, DailyMetric, DataSource, DatasetStatus, QueryResult, Row, Value};

use crate::error::Result;
use async_trait::async_trait;

/// Trait defining the interface for query execution backends.
///
/// All operations are async and return Results with TallyError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the underlying connections.
    async fn close(&self) -> Result<()>;
}
