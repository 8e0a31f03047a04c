//! End-to-end tests of the question-to-answer pipeline.

use std::sync::Arc;
use std::time::Duration;

use db_tally::db::Value;
use db_tally::generator::{GenerationError, Strategy};
use db_tally::llm::MockLlmClient;
use db_tally::safety::RejectReason;
use db_tally::{Orchestrator, Outcome, PipelineConfig, PipelineStage};
use pretty_assertions::assert_eq;

use super::common::{counting_store, FIXTURE_2024_TOTAL, FIXTURE_ALL_TIME_TOTAL, FIXTURE_ROWS};

fn remote_config(timeout: Duration) -> PipelineConfig {
    PipelineConfig {
        remote_capability_configured: true,
        remote_model_identifier: "test-model".to_string(),
        request_timeout: timeout,
    }
}

#[tokio::test]
async fn test_year_total_from_template() {
    let db = counting_store().await;
    let orchestrator = Orchestrator::new(PipelineConfig::default(), db.clone(), None);

    let bundle = orchestrator.answer("total for the year 2024").await;

    assert_eq!(bundle.stage, PipelineStage::Succeeded);
    assert_eq!(bundle.strategy, Some(Strategy::Template));
    assert_eq!(
        bundle.result().unwrap().scalar("answer"),
        Some(&Value::Int(FIXTURE_2024_TOTAL))
    );
    assert_eq!(db.executed(), 1);
}

#[tokio::test]
async fn test_drop_the_table_never_executes() {
    let db = counting_store().await;
    let orchestrator = Orchestrator::new(PipelineConfig::default(), db.clone(), None);

    let bundle = orchestrator.answer("drop the table").await;

    assert!(bundle.stage.is_terminal());
    assert!(!bundle.is_success());
    assert_eq!(db.executed(), 0);
}

#[tokio::test]
async fn test_destructive_remote_output_is_rejected() {
    let db = counting_store().await;
    let mock = MockLlmClient::new().with_response("drop", "DROP TABLE daily_metric");
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_secs(5)),
        db.clone(),
        Some(Arc::new(mock)),
    );

    let bundle = orchestrator.answer("drop the table").await;

    assert_eq!(bundle.sql_text.as_deref(), Some("DROP TABLE daily_metric"));
    assert!(matches!(bundle.outcome, Outcome::Rejected(_)));
    assert_eq!(db.executed(), 0);
}

#[tokio::test]
async fn test_keyword_hidden_in_comment_is_rejected() {
    let db = counting_store().await;
    let sql = "SELECT * FROM daily_metric /* DROP TABLE daily_metric */";
    let mock = MockLlmClient::new().with_fallback(sql);
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_secs(5)),
        db.clone(),
        Some(Arc::new(mock)),
    );

    let bundle = orchestrator.answer("drop the table").await;

    assert!(matches!(
        bundle.outcome,
        Outcome::Rejected(RejectReason::ForbiddenKeyword)
    ));
    assert_eq!(bundle.sql_text.as_deref(), Some(sql));
    assert_eq!(db.executed(), 0);
}

#[tokio::test]
async fn test_multiple_statements_rejected() {
    let db = counting_store().await;
    let sql = "SELECT * FROM daily_metric; SELECT * FROM secrets";
    let mock = MockLlmClient::new().with_fallback(sql);
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_secs(5)),
        db.clone(),
        Some(Arc::new(mock)),
    );

    let bundle = orchestrator.answer("show me everything").await;

    assert_eq!(bundle.stage, PipelineStage::Rejected);
    assert!(matches!(
        bundle.outcome,
        Outcome::Rejected(RejectReason::MultipleStatements)
    ));
    assert_eq!(db.executed(), 0);
}

#[tokio::test]
async fn test_remote_timeout_falls_back_to_matching_template() {
    let db = counting_store().await;
    let slow = MockLlmClient::new().with_delay(Duration::from_secs(2));
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_millis(50)),
        db.clone(),
        Some(Arc::new(slow.clone())),
    );

    let bundle = orchestrator.answer("total for the year 2024").await;

    assert_eq!(slow.call_count(), 1);
    assert_eq!(bundle.strategy, Some(Strategy::Template));
    assert_eq!(
        bundle.result().unwrap().scalar("answer"),
        Some(&Value::Int(FIXTURE_2024_TOTAL))
    );
}

#[tokio::test]
async fn test_remote_timeout_without_template_fails_generation() {
    let db = counting_store().await;
    let slow = MockLlmClient::new().with_delay(Duration::from_secs(2));
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_millis(50)),
        db.clone(),
        Some(Arc::new(slow)),
    );

    let bundle = orchestrator.answer("what colour is the sky").await;

    assert_eq!(bundle.stage, PipelineStage::GenerationFailed);
    assert_eq!(bundle.sql_text, None);
    match bundle.outcome {
        Outcome::GenerationFailed(errors) => assert_eq!(
            errors,
            vec![
                GenerationError::Timeout(Duration::from_millis(50)),
                GenerationError::NoTemplateMatch,
            ]
        ),
        other => panic!("expected GenerationFailed, got {other:?}"),
    }
    assert_eq!(db.executed(), 0);
}

#[tokio::test]
async fn test_remote_answer_is_executed() {
    let db = counting_store().await;
    let orchestrator = Orchestrator::new(
        remote_config(Duration::from_secs(5)),
        db.clone(),
        Some(Arc::new(MockLlmClient::new())),
    );

    let bundle = orchestrator.answer("Sum of everything please").await;

    assert_eq!(bundle.strategy, Some(Strategy::Remote));
    assert_eq!(
        bundle.summary.as_deref(),
        Some(format!("Answer: {FIXTURE_ALL_TIME_TOTAL}").as_str())
    );
}

#[tokio::test]
async fn test_remote_model_identifier_reaches_client() {
    let mock = MockLlmClient::new();
    let config = PipelineConfig {
        remote_model_identifier: "org/custom-sql-model".to_string(),
        ..remote_config(Duration::from_secs(5))
    };
    let orchestrator = Orchestrator::new(config, counting_store().await, Some(Arc::new(mock.clone())));

    let bundle = orchestrator.answer("Sum of everything please").await;

    assert!(bundle.is_success());
    assert_eq!(mock.last_model().as_deref(), Some("org/custom-sql-model"));
}

#[tokio::test]
async fn test_every_template_question_succeeds_without_remote() {
    let db = counting_store().await;
    let orchestrator = Orchestrator::new(PipelineConfig::default(), db.clone(), None);

    let questions = [
        ("average for 2024", "avg_for_year"),
        ("total for the year 2024", "total_for_year"),
        ("total this year", "total_this_year"),
        ("average this year", "avg_this_year"),
        ("total this month", "total_this_month"),
        ("average this month", "avg_this_month"),
        ("total for the last 7 days", "total_last_7_days"),
        ("weekday vs weekend", "weekday_vs_weekend_average"),
        ("average by day of week", "weekday_average"),
        ("top 5 days", "top_n_days"),
        ("best days", "top_n_days"),
        ("worst days", "bottom_n_days"),
        ("weekly trend", "weekly_trend_last_12_weeks"),
        ("average per day", "avg_per_day_all_time"),
        ("total all time", "total_all_time"),
        ("how many days", "days_recorded"),
    ];

    for (question, rule) in questions {
        let bundle = orchestrator.answer(question).await;
        assert_eq!(bundle.stage, PipelineStage::Succeeded, "question: {question}");
        assert_eq!(bundle.matched_rule.as_deref(), Some(rule), "question: {question}");
    }
    assert_eq!(db.executed(), questions.len());
}

#[tokio::test]
async fn test_known_template_answers() {
    let orchestrator = Orchestrator::new(PipelineConfig::default(), counting_store().await, None);

    let answer = |bundle: db_tally::ResponseBundle| {
        bundle.result().and_then(|r| r.scalar("answer").cloned())
    };

    assert_eq!(
        answer(orchestrator.answer("how many days").await),
        Some(Value::Int(FIXTURE_ROWS as i64))
    );
    assert_eq!(
        answer(orchestrator.answer("total for 2023").await),
        Some(Value::Int(500))
    );
    assert_eq!(
        answer(orchestrator.answer("average for 2024").await),
        Some(Value::Float(5500.0))
    );
    // COALESCE keeps an empty year at zero rather than NULL.
    assert_eq!(
        answer(orchestrator.answer("total for 1999").await),
        Some(Value::Int(0))
    );

    let top = orchestrator.answer("top 2 days").await;
    let rows = &top.result().unwrap().rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::from("2024-01-10"));
    assert_eq!(rows[1][0], Value::from("2024-01-09"));
}

#[tokio::test]
async fn test_response_bundle_json() {
    let orchestrator = Orchestrator::new(PipelineConfig::default(), counting_store().await, None);
    let bundle = orchestrator.answer("total for the year 2024").await;

    let json = serde_json::to_value(&bundle).unwrap();
    assert_eq!(json["stage"], "succeeded");
    assert_eq!(json["strategy"], "template");
    assert_eq!(json["matched_rule"], "total_for_year");
    assert_eq!(json["outcome"]["status"], "succeeded");
    assert_eq!(json["summary"], "Answer: 55000");
    assert!(json["sql_text"].as_str().unwrap().starts_with("SELECT"));
}
