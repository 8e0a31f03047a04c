//! Shared fixtures for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use db_tally::db::{DailyMetric, DataSource, DatabaseClient, MetricStore, QueryResult};
use db_tally::error::Result;

/// Sum of the fixture's 2024 rows: 1000 + 2000 + ... + 10000.
pub const FIXTURE_2024_TOTAL: i64 = 55_000;

/// Sum of every fixture row.
pub const FIXTURE_ALL_TIME_TOTAL: i64 = 56_200;

pub const FIXTURE_ROWS: usize = 12;

/// Ten days in January 2024 plus one day on each side of the year.
pub fn fixture_rows() -> Vec<DailyMetric> {
    let mut rows: Vec<DailyMetric> = (1..=10)
        .map(|d| {
            DailyMetric::new(
                NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
                1000 * u64::from(d),
            )
        })
        .collect();
    rows.push(DailyMetric::new(
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        500,
    ));
    rows.push(DailyMetric::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        700,
    ));
    rows
}

pub async fn fixture_store() -> Arc<MetricStore> {
    Arc::new(
        MetricStore::in_memory_with(&fixture_rows(), DataSource::Empty)
            .await
            .unwrap(),
    )
}

/// Wraps a store and counts how many queries reach it.
pub struct CountingClient {
    inner: Arc<MetricStore>,
    executed: AtomicUsize,
}

impl CountingClient {
    pub fn new(inner: Arc<MetricStore>) -> Self {
        Self {
            inner,
            executed: AtomicUsize::new(0),
        }
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseClient for CountingClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_query(sql).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

pub async fn counting_store() -> Arc<CountingClient> {
    Arc::new(CountingClient::new(fixture_store().await))
}
