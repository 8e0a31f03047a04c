//! Store tests: atomic dataset replacement and file persistence.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use db_tally::db::{
    generate_daily_metrics, DailyMetric, DataSource, DatabaseClient, DummyConfig, MetricStore,
    Value,
};
use db_tally::llm::MockLlmClient;
use db_tally::{Orchestrator, Outcome, PipelineConfig};
use tempfile::tempdir;
use tokio::sync::Barrier;

use super::common::{fixture_rows, FIXTURE_2024_TOTAL, FIXTURE_ROWS};

fn count_of(value: &Value) -> usize {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(usize::MAX)
}

async fn row_count(store: &MetricStore) -> usize {
    let result = store
        .execute_query("SELECT COUNT(*) AS answer FROM daily_metric")
        .await
        .unwrap();
    count_of(result.scalar("answer").unwrap())
}

fn replacement_rows() -> Vec<DailyMetric> {
    generate_daily_metrics(&DummyConfig {
        days: 400,
        seed: 9,
        start_date: NaiveDate::from_ymd_opt(2022, 1, 1),
    })
}

/// Reads until `target` rows show up, returning every count seen on the way.
async fn read_until(store: &MetricStore, target: usize) -> Vec<usize> {
    let mut seen = Vec::new();
    loop {
        let count = row_count(store).await;
        seen.push(count);
        if count == target {
            return seen;
        }
        tokio::task::yield_now().await;
    }
}

/// Starts ten readers and `write` together. Every reader keeps reading until
/// it sees `new`, so its reads span the swap.
async fn readers_across_swap<F>(store: Arc<MetricStore>, old: usize, new: usize, write: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let barrier = Arc::new(Barrier::new(11));

    let mut readers = Vec::new();
    for _ in 0..10 {
        let (store, barrier) = (Arc::clone(&store), Arc::clone(&barrier));
        readers.push(tokio::spawn(async move {
            barrier.wait().await;
            read_until(&store, new).await
        }));
    }
    let writer = tokio::spawn(async move {
        barrier.wait().await;
        write.await;
    });

    let seen = tokio::time::timeout(Duration::from_secs(30), futures::future::join_all(readers))
        .await
        .unwrap();
    writer.await.unwrap();

    for counts in seen {
        let counts = counts.unwrap();
        assert!(
            counts.iter().all(|&c| c == old || c == new),
            "reader saw {counts:?}"
        );
        assert_eq!(counts.last(), Some(&new));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_replacement_in_memory() {
    let store = Arc::new(
        MetricStore::in_memory_with(&fixture_rows(), DataSource::Empty)
            .await
            .unwrap(),
    );
    let replacement = replacement_rows();
    let new = replacement.len();

    let writer = Arc::clone(&store);
    readers_across_swap(Arc::clone(&store), FIXTURE_ROWS, new, async move {
        let loaded = writer
            .replace_all(&replacement, DataSource::Synthetic { days: 400, seed: 9 })
            .await
            .unwrap();
        assert_eq!(loaded, new);
    })
    .await;

    assert_eq!(row_count(&store).await, new);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_replacement_on_disk() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MetricStore::open(&dir.path().join("tally.db")).await.unwrap());
    store
        .replace_all(&fixture_rows(), DataSource::Empty)
        .await
        .unwrap();

    let writer = Arc::clone(&store);
    readers_across_swap(Arc::clone(&store), FIXTURE_ROWS, 0, async move {
        writer.reset().await.unwrap();
    })
    .await;

    let replacement = replacement_rows();
    store
        .replace_all(&replacement, DataSource::Empty)
        .await
        .unwrap();
    assert_eq!(row_count(&store).await, replacement.len());
}

#[tokio::test]
async fn test_runaway_query_does_not_block_store() {
    let store = Arc::new(
        MetricStore::in_memory_with(&fixture_rows(), DataSource::Empty)
            .await
            .unwrap()
            .with_query_timeout(Duration::from_millis(300)),
    );
    let runaway = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT COUNT(*) AS answer FROM c";
    let mock = MockLlmClient::new().with_fallback(runaway);
    let config = PipelineConfig {
        remote_capability_configured: true,
        ..PipelineConfig::default()
    };
    let orchestrator = Orchestrator::new(config, store.clone(), Some(Arc::new(mock)));

    let bundle = tokio::time::timeout(Duration::from_secs(5), orchestrator.answer("count forever"))
        .await
        .unwrap();
    match &bundle.outcome {
        Outcome::ExecutionFailed(message) => assert!(message.contains("timed out"), "{message}"),
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }

    let templates = Orchestrator::new(PipelineConfig::default(), store.clone(), None);
    let bundle = templates.answer("total for the year 2024").await;
    assert_eq!(
        bundle.result().unwrap().scalar("answer"),
        Some(&Value::Int(FIXTURE_2024_TOTAL))
    );

    tokio::time::timeout(Duration::from_secs(5), store.reset())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row_count(&store).await, 0);
}

#[tokio::test]
async fn test_pipeline_over_reopened_file_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data").join("tally.db");

    {
        let store = MetricStore::open(&path).await.unwrap();
        store
            .replace_all(
                &fixture_rows(),
                DataSource::Ingested {
                    path: "export.xml".to_string(),
                },
            )
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = Arc::new(MetricStore::open(&path).await.unwrap());
    let status = store.status().await.unwrap();
    assert_eq!(status.row_count, FIXTURE_ROWS);
    assert_eq!(status.first_date.as_deref(), Some("2023-12-31"));
    assert_eq!(status.last_date.as_deref(), Some("2025-01-01"));
    assert_eq!(status.source_type.as_deref(), Some("ingested"));

    let orchestrator = Orchestrator::new(PipelineConfig::default(), store.clone(), None);
    let bundle = orchestrator.answer("total for the year 2024").await;
    assert_eq!(
        bundle.result().unwrap().scalar("answer"),
        Some(&Value::Int(FIXTURE_2024_TOTAL))
    );
}

#[tokio::test]
async fn test_file_store_queries_cannot_write() {
    let dir = tempdir().unwrap();
    let store = MetricStore::open(&dir.path().join("tally.db")).await.unwrap();
    store
        .replace_all(&fixture_rows(), DataSource::Empty)
        .await
        .unwrap();

    assert!(store.execute_query("DELETE FROM daily_metric").await.is_err());
    assert_eq!(row_count(&store).await, FIXTURE_ROWS);
}

#[tokio::test]
async fn test_synthetic_dataset_loads() {
    let cfg = DummyConfig {
        days: 30,
        seed: 42,
        start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
    };
    let rows = generate_daily_metrics(&cfg);
    assert_eq!(rows, generate_daily_metrics(&cfg));

    let store = MetricStore::in_memory_with(&rows, DataSource::Synthetic { days: 30, seed: 42 })
        .await
        .unwrap();
    let status = store.status().await.unwrap();
    assert_eq!(status.row_count, 30);
    assert_eq!(status.first_date.as_deref(), Some("2024-03-01"));
    assert_eq!(status.last_date.as_deref(), Some("2024-03-30"));
    assert_eq!(status.source_detail.as_deref(), Some("days=30 seed=42"));
}
