//! Guardrail properties checked across many inputs.

use db_tally::db::SchemaDescriptor;
use db_tally::safety::{RejectReason, SqlGuard, FORBIDDEN_KEYWORDS};

fn guard() -> SqlGuard {
    SqlGuard::new(SchemaDescriptor::curated())
}

fn reason(sql: &str) -> Option<RejectReason> {
    guard().validate(sql).reason()
}

#[test]
fn test_every_forbidden_keyword_is_rejected_in_any_hiding_place() {
    for keyword in FORBIDDEN_KEYWORDS {
        let lower = keyword.to_lowercase();
        let cases = [
            format!("SELECT value FROM daily_metric WHERE date > {keyword}"),
            format!("SELECT value FROM daily_metric /* {keyword} */"),
            format!("SELECT value FROM daily_metric -- {lower} everything"),
            format!("SELECT {lower}(value) FROM daily_metric"),
            format!("SELECT value FROM daily_metric/*{lower}*/"),
        ];
        for sql in cases {
            assert_eq!(
                reason(&sql),
                Some(RejectReason::ForbiddenKeyword),
                "sql: {sql}"
            );
        }
    }
}

#[test]
fn test_keyword_split_by_empty_comment() {
    assert_eq!(
        reason("SELECT value FROM daily_metric WHERE 1 = 1 OR DR/**/OP"),
        Some(RejectReason::ForbiddenKeyword)
    );
    assert_eq!(
        reason("SELECT value FROM daily_metric WHERE IN/**/SERT = 1"),
        Some(RejectReason::ForbiddenKeyword)
    );
}

#[test]
fn test_keyword_inside_string_literal_is_data() {
    assert_eq!(
        reason("SELECT COUNT(*) AS answer FROM daily_metric WHERE date <> 'drop table'"),
        None
    );
}

#[test]
fn test_unlisted_tables_rejected() {
    let cases = [
        "SELECT * FROM secrets",
        "SELECT * FROM dataset_source",
        "SELECT * FROM sqlite_master",
        "SELECT * FROM daily_metric JOIN secrets ON 1 = 1",
        "SELECT * FROM daily_metric, secrets",
        "SELECT * FROM daily_metric WHERE value IN (SELECT x FROM secrets)",
        "SELECT * FROM main.secrets",
        "SELECT * FROM \"secrets\"",
        "SELECT * FROM pragma_table_info('daily_metric')",
        "WITH t AS (SELECT * FROM secrets) SELECT * FROM t",
        "SELECT source_type, source_path FROM dataset_source \
         WHERE 1 IN (WITH dataset_source AS (SELECT 1) SELECT * FROM dataset_source)",
        "WITH dataset_source AS (SELECT 1) SELECT * FROM main.dataset_source",
        // NOTNULL keeps sqlparser out, leaving only the lexical scan.
        "SELECT * FROM (dataset_source) WHERE 1 NOTNULL",
        "SELECT s.* FROM daily_metric d JOIN daily_metric e ON d.date = e.date, \
         dataset_source s WHERE d.value NOTNULL",
    ];
    for sql in cases {
        assert_eq!(reason(sql), Some(RejectReason::TableNotAllowed), "sql: {sql}");
    }
}

#[test]
fn test_allowed_table_references() {
    let cases = [
        "SELECT * FROM daily_metric",
        "select * from DAILY_METRIC",
        "SELECT * FROM main.daily_metric",
        "SELECT a.date FROM daily_metric a JOIN daily_metric b ON a.date = b.date",
        "WITH recent AS (SELECT * FROM daily_metric) SELECT SUM(value) FROM recent",
        "SELECT strftime('%Y', date) AS year, SUM(value) FROM daily_metric GROUP BY year",
        "SELECT replace(date, '-', '') FROM daily_metric",
        "SELECT * FROM (daily_metric) WHERE value NOTNULL",
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 3) \
         SELECT x FROM c",
    ];
    for sql in cases {
        assert_eq!(reason(sql), None, "sql: {sql}");
    }
}

#[test]
fn test_separator_followed_by_content() {
    let cases = [
        "SELECT * FROM daily_metric; SELECT * FROM secrets",
        "SELECT * FROM daily_metric;SELECT 1",
        "SELECT * FROM daily_metric; x",
        "SELECT * FROM daily_metric;; SELECT 1",
        "SELECT * FROM daily_metric;;",
        "SELECT * FROM daily_metric; -- done",
        "SELECT * FROM daily_metric; /* done */",
    ];
    for sql in cases {
        assert_eq!(reason(sql), Some(RejectReason::MultipleStatements), "sql: {sql}");
    }
}

#[test]
fn test_trailing_separator_is_fine() {
    for sql in [
        "SELECT * FROM daily_metric;",
        "SELECT * FROM daily_metric;   ",
        "SELECT * FROM daily_metric;\n\t",
        "-- total\nSELECT * FROM daily_metric;",
    ] {
        assert_eq!(reason(sql), None, "sql: {sql}");
    }
}

#[test]
fn test_only_queries_pass() {
    for sql in [
        "DELETE FROM daily_metric",
        "REPLACE INTO daily_metric VALUES ('2024-01-01', 1)",
        "EXPLAIN SELECT * FROM daily_metric",
        "VALUES (1)",
        "",
        "   ",
        "-- just a comment",
    ] {
        assert_eq!(reason(sql), Some(RejectReason::NotSelectOnly), "sql: {sql:?}");
    }
}

#[test]
fn test_validation_is_idempotent() {
    let guard = guard();
    for sql in [
        "SELECT * FROM daily_metric",
        "SELECT * FROM secrets",
        "DROP TABLE daily_metric",
        "SELECT 1; SELECT 2",
        "SELECT * FROM daily_metric /* delete */",
    ] {
        assert_eq!(guard.validate(sql), guard.validate(sql), "sql: {sql}");
    }
}
