//! SQLite-backed metric store.
//!
//! Holds the curated `daily_metric` table, either in a file or in memory.
//! Query connections never write: file stores are opened read-only and
//! in-memory stores are sealed with `PRAGMA query_only`. Replacing the
//! dataset builds a complete new database first and swaps it in under an
//! exclusive lock, so readers see the old rows or the new rows, never a mix.
//!
//! Every checkout of a reader connection installs a SQLite progress handler
//! with a fresh deadline. A statement that runs past it is interrupted inside
//! the engine, so it releases its connection instead of running on after the
//! caller has given up.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::schema::DAILY_METRIC_TABLE;
use super::{ColumnInfo, DailyMetric, DataSource, DatabaseClient, DatasetStatus, QueryResult, Row, Value};
use crate::error::{Result, TallyError};

/// Maximum number of rows to return from a query.
const MAX_ROWS: usize = 1000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// VM instructions between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Extra wait for the engine to notice its deadline before giving up on it.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on closing the connections of a retired dataset.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections kept for concurrent readers of a file store.
const FILE_READ_CONNECTIONS: u32 = 4;

const CREATE_DAILY_METRIC: &str = "CREATE TABLE IF NOT EXISTS daily_metric (
    date DATE PRIMARY KEY,
    value INTEGER NOT NULL CHECK (value >= 0)
)";

const CREATE_DATASET_SOURCE: &str = "CREATE TABLE IF NOT EXISTS dataset_source (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    source_type TEXT NOT NULL,
    source_path TEXT,
    last_updated TEXT NOT NULL
)";

#[derive(Debug, Clone)]
enum Location {
    Memory,
    File(PathBuf),
}

/// The embedded analytical store.
pub struct MetricStore {
    location: Location,
    pool: RwLock<SqlitePool>,
    query_timeout: Duration,
}

impl MetricStore {
    /// Opens (creating if needed) a file-backed store.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;

        let writer = writer_pool(path).await?;
        init_schema(&writer).await?;
        writer.close().await;

        let pool = reader_pool(path).await?;
        info!("Metric store opened at {}", path.display());

        Ok(Self {
            location: Location::File(path.to_path_buf()),
            pool: RwLock::new(pool),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        })
    }

    /// Creates an empty in-memory store.
    pub async fn in_memory() -> Result<Self> {
        let pool = memory_pool().await?;
        init_schema(&pool).await?;
        seal_query_only(&pool).await?;
        debug!("In-memory metric store created");

        Ok(Self {
            location: Location::Memory,
            pool: RwLock::new(pool),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        })
    }

    /// Sets how long one query may run before it is interrupted.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Creates an in-memory store already holding `rows`.
    pub async fn in_memory_with(rows: &[DailyMetric], source: DataSource) -> Result<Self> {
        let store = Self::in_memory().await?;
        store.replace_all(rows, source).await?;
        Ok(store)
    }

    /// Returns the backing file, if the store is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::Memory => None,
            Location::File(path) => Some(path),
        }
    }

    /// Replaces the whole dataset with `rows`.
    ///
    /// The replacement is built to completion before it becomes visible. If
    /// the swap fails, the previous dataset keeps serving reads. Returns the
    /// number of rows now in the store.
    pub async fn replace_all(&self, rows: &[DailyMetric], source: DataSource) -> Result<usize> {
        validate_rows(rows)?;
        let start = Instant::now();

        match &self.location {
            Location::Memory => {
                let fresh = memory_pool().await?;
                init_schema(&fresh).await?;
                populate(&fresh, rows, &source).await?;
                seal_query_only(&fresh).await?;

                let old = {
                    let mut guard = self.pool.write().await;
                    std::mem::replace(&mut *guard, fresh)
                };
                close_retired(old).await;
            }
            Location::File(path) => {
                let staging = staging_path(path);
                remove_if_exists(&staging)?;

                let writer = writer_pool(&staging).await?;
                let built = async {
                    init_schema(&writer).await?;
                    populate(&writer, rows, &source).await
                }
                .await;
                writer.close().await;
                if let Err(e) = built {
                    let _ = std::fs::remove_file(&staging);
                    return Err(e);
                }

                // Open readers keep the old file until they are closed.
                let mut guard = self.pool.write().await;
                if let Err(e) = std::fs::rename(&staging, path) {
                    let _ = std::fs::remove_file(&staging);
                    return Err(TallyError::store(format!(
                        "Failed to move staged dataset into {}: {e}",
                        path.display()
                    )));
                }
                let fresh = reader_pool(path).await?;
                let old = std::mem::replace(&mut *guard, fresh);
                drop(guard);
                close_retired(old).await;
            }
        }

        info!(
            rows = rows.len(),
            source = %source,
            elapsed_ms = start.elapsed().as_millis(),
            "Dataset replaced"
        );
        Ok(rows.len())
    }

    /// Empties the dataset.
    pub async fn reset(&self) -> Result<()> {
        self.replace_all(&[], DataSource::Empty).await.map(|_| ())
    }

    /// Reports row count, date range, and provenance of the current dataset.
    pub async fn status(&self) -> Result<DatasetStatus> {
        let pool = self.pool.read().await;
        let mut conn = checkout(&pool, Instant::now() + self.query_timeout)
            .await
            .map_err(|e| TallyError::store(format_query_error(e)))?;

        let (count, first_date, last_date): (i64, Option<String>, Option<String>) =
            sqlx::query_as("SELECT COUNT(*), MIN(date), MAX(date) FROM daily_metric")
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| TallyError::store(format_query_error(e)))?;

        let source: Option<(String, Option<String>, String)> = sqlx::query_as(
            "SELECT source_type, source_path, last_updated FROM dataset_source WHERE id = 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| TallyError::store(format_query_error(e)))?;

        let (source_type, source_detail, last_updated) = match source {
            Some((kind, detail, updated)) => {
                let updated = DateTime::parse_from_rfc3339(&updated)
                    .map(|d| d.with_timezone(&Utc))
                    .ok();
                (Some(kind), detail, updated)
            }
            None => (None, None, None),
        };

        Ok(DatasetStatus {
            row_count: usize::try_from(count).unwrap_or(0),
            first_date,
            last_date,
            source_type,
            source_detail,
            last_updated,
        })
    }

    /// Fetches column metadata for a statement without rows to read it from.
    async fn describe_columns(conn: &mut SqliteConnection, sql: &str) -> Vec<ColumnInfo> {
        match conn.prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe result columns: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DatabaseClient for MetricStore {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        // Held for the whole query so a dataset swap waits for in-flight readers.
        let pool = self.pool.read().await;
        let start = Instant::now();
        let limit = self.query_timeout;
        let mut conn = checkout(&pool, start + limit)
            .await
            .map_err(|e| TallyError::query(format_query_error(e)))?;

        let fetched =
            tokio::time::timeout(limit + INTERRUPT_GRACE, sqlx::query(sql).fetch_all(&mut *conn))
                .await;
        let result = match fetched {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) if start.elapsed() < limit => {
                return Err(TallyError::query(format_query_error(e)));
            }
            _ => {
                warn!(timeout = ?limit, "Query interrupted at its deadline");
                return Err(TallyError::query(format!("Query timed out after {limit:?}")));
            }
        };

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| ColumnInfo::new(col.name(), column_type_name(first_row, i)))
                .collect(),
            None => Self::describe_columns(&mut conn, sql).await,
        };

        let total_rows = result.len();
        let was_truncated = total_rows > MAX_ROWS;
        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.read().await.close().await;
        Ok(())
    }
}

/// Checks out a reader connection whose statements are interrupted at
/// `deadline`. Re-arming on every checkout means a stale deadline from an
/// earlier query never fires.
async fn checkout(
    pool: &SqlitePool,
    deadline: Instant,
) -> std::result::Result<PoolConnection<Sqlite>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.lock_handle()
        .await?
        .set_progress_handler(PROGRESS_CHECK_OPS, move || Instant::now() < deadline);
    Ok(conn)
}

/// Closes a swapped-out pool without letting a stuck connection hold up the
/// caller.
async fn close_retired(pool: SqlitePool) {
    if tokio::time::timeout(CLOSE_TIMEOUT, pool.close()).await.is_err() {
        warn!("Retired store connections did not close in time");
    }
}

/// Rejects datasets that would break the one-row-per-date invariant.
fn validate_rows(rows: &[DailyMetric]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.date) {
            return Err(TallyError::store(format!(
                "Duplicate date {} in dataset; deduplicate before loading",
                row.date
            )));
        }
        if i64::try_from(row.value).is_err() {
            return Err(TallyError::store(format!(
                "Value {} on {} exceeds the storable range",
                row.value, row.date
            )));
        }
    }
    Ok(())
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in [CREATE_DAILY_METRIC, CREATE_DATASET_SOURCE] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| TallyError::store(format!("Failed to initialise schema: {e}")))?;
    }
    Ok(())
}

/// Writes `rows` and the provenance record in one transaction.
async fn populate(pool: &SqlitePool, rows: &[DailyMetric], source: &DataSource) -> Result<()> {
    let store_err = |e: sqlx::Error| TallyError::store(format!("Failed to load dataset: {e}"));

    let mut tx = pool.begin().await.map_err(store_err)?;

    sqlx::query(&format!("DELETE FROM {DAILY_METRIC_TABLE}"))
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

    let insert = format!("INSERT INTO {DAILY_METRIC_TABLE} (date, value) VALUES (?, ?)");
    for row in rows {
        // validate_rows has already checked the range.
        let value = i64::try_from(row.value).unwrap_or(i64::MAX);
        sqlx::query(&insert)
            .bind(row.date.format("%Y-%m-%d").to_string())
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
    }

    sqlx::query("DELETE FROM dataset_source")
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
    sqlx::query(
        "INSERT INTO dataset_source (id, source_type, source_path, last_updated) VALUES (1, ?, ?, ?)",
    )
    .bind(source.source_type())
    .bind(source.detail())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)
}

async fn seal_query_only(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA query_only = ON")
        .execute(pool)
        .await
        .map_err(|e| TallyError::store(format!("Failed to seal store: {e}")))?;
    Ok(())
}

/// Single long-lived connection: the database lives exactly as long as it does.
async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| TallyError::store(format!("Invalid in-memory options: {e}")))?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| TallyError::store(format!("Failed to create in-memory store: {e}")))
}

async fn writer_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| {
            TallyError::store(format!("Failed to open {} for writing: {e}", path.display()))
        })
}

async fn reader_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(FILE_READ_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| TallyError::store(format!("Failed to open {}: {e}", path.display())))
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tally.db".to_string());
    path.with_file_name(format!("{name}.staging"))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TallyError::store(format!(
            "Failed to remove stale {}: {e}",
            path.display()
        ))),
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            TallyError::store(format!(
                "Failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Declared column type, or the storage class of the value when undeclared.
fn column_type_name(row: &SqliteRow, index: usize) -> String {
    let declared = row.columns()[index].type_info().name();
    if declared != "NULL" {
        return declared.to_string();
    }
    row.try_get_raw(index)
        .map(|raw| raw.type_info().name().to_string())
        .unwrap_or_else(|_| declared.to_string())
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Decodes by the value's runtime storage class, not the declared column type.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_string();

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Returns the engine's own message, without sqlx's wrapping.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
