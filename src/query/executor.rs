//! Execution of guard-approved queries.
//!
//! Only an [`AcceptedQuery`] can be executed, so a rejected candidate cannot
//! reach the store by construction. Engine errors are surfaced verbatim and
//! never retried.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::Result;
use crate::safety::AcceptedQuery;

/// Query executor over a store connection.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(db: &'a dyn DatabaseClient) -> Self {
        Self { db }
    }

    /// Runs a validated query.
    pub async fn execute(&self, query: &AcceptedQuery) -> Result<QueryOutcome> {
        let start = Instant::now();
        let result = self.db.execute_query(query.as_str()).await;
        let execution_time = start.elapsed();

        match result {
            Ok(result) => {
                debug!(
                    rows = result.row_count,
                    truncated = result.was_truncated,
                    elapsed_ms = execution_time.as_millis() as u64,
                    "Query executed"
                );
                Ok(QueryOutcome {
                    result,
                    execution_time,
                })
            }
            Err(e) => {
                warn!(error = %e, sql = %query, "Query execution failed");
                Err(e)
            }
        }
    }
}

/// Successful query execution outcome.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The query result.
    pub result: QueryResult,
    /// Wall time including any wait for the store lock.
    pub execution_time: Duration,
}
