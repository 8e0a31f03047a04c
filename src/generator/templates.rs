//! Template strategy: a small deterministic question router.
//!
//! Questions are normalized (lowercase, punctuation to spaces, whitespace
//! collapsed) and tested against an ordered rule list; the first rule that
//! matches produces pre-written SQLite SQL. Single-number answers are always
//! aliased `answer`.

use std::sync::OnceLock;

use regex::Regex;

use crate::db::DAILY_METRIC_TABLE;

/// Rows returned by the top/bottom rules when no count is given.
pub const DEFAULT_TOP_N: u64 = 10;
/// Largest count the top/bottom rules accept; larger requests are clamped.
pub const MAX_TOP_N: u64 = 50;

/// A matched rule and the SQL it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    pub rule: &'static str,
    pub sql: String,
}

impl TemplateMatch {
    fn new(rule: &'static str, sql: String) -> Self {
        Self { rule, sql }
    }
}

/// Deterministic generator backed by fixed question patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the first rule matching `question`, if any.
    pub fn route(&self, question: &str) -> Option<TemplateMatch> {
        route(&normalize(question))
    }
}

/// Lowercases, maps punctuation to spaces, and collapses whitespace.
pub fn normalize(question: &str) -> String {
    question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year regex"))
}

fn top_n_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:top|best|highest) (\d+)\b").expect("valid top regex"))
}

fn bottom_n_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:bottom|lowest|worst) (\d+)\b").expect("valid bottom regex")
    })
}

/// True if `q` contains `phrase` on word boundaries.
fn has(q: &str, phrase: &str) -> bool {
    format!(" {q} ").contains(&format!(" {phrase} "))
}

fn has_any(q: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| has(q, p))
}

fn clamp_n(captured: Option<&str>) -> u64 {
    match captured {
        Some(digits) => digits.parse::<u64>().map_or(MAX_TOP_N, |n| n.clamp(1, MAX_TOP_N)),
        None => DEFAULT_TOP_N,
    }
}

fn wants_average(q: &str) -> bool {
    has_any(q, &["average", "avg", "mean"])
}

fn mentions_day(q: &str) -> bool {
    has_any(q, &["day", "days"])
}

fn route(q: &str) -> Option<TemplateMatch> {
    let t = DAILY_METRIC_TABLE;
    if q.is_empty() {
        return None;
    }

    if let Some(year) = year_regex().find(q) {
        let year: u32 = year.as_str().parse().ok()?;
        let range = format!(
            "WHERE date >= '{year:04}-01-01' AND date < '{next:04}-01-01'",
            next = year + 1
        );
        return Some(if wants_average(q) {
            TemplateMatch::new(
                "avg_for_year",
                format!("SELECT COALESCE(AVG(value), 0) AS answer FROM {t} {range}"),
            )
        } else {
            TemplateMatch::new(
                "total_for_year",
                format!("SELECT COALESCE(SUM(value), 0) AS answer FROM {t} {range}"),
            )
        });
    }

    if has_any(q, &["this year", "this yr"]) {
        let range = "WHERE date >= date('now', 'start of year') \
                     AND date < date('now', 'start of year', '+1 year')";
        return Some(if wants_average(q) {
            TemplateMatch::new(
                "avg_this_year",
                format!("SELECT COALESCE(AVG(value), 0) AS answer FROM {t} {range}"),
            )
        } else {
            TemplateMatch::new(
                "total_this_year",
                format!("SELECT COALESCE(SUM(value), 0) AS answer FROM {t} {range}"),
            )
        });
    }

    if has(q, "this month") {
        let range = "WHERE date >= date('now', 'start of month') \
                     AND date < date('now', 'start of month', '+1 month')";
        return Some(if wants_average(q) {
            TemplateMatch::new(
                "avg_this_month",
                format!("SELECT COALESCE(AVG(value), 0) AS answer FROM {t} {range}"),
            )
        } else {
            TemplateMatch::new(
                "total_this_month",
                format!("SELECT COALESCE(SUM(value), 0) AS answer FROM {t} {range}"),
            )
        });
    }

    if has_any(
        q,
        &["last 7 days", "past 7 days", "last seven days", "past week", "this week"],
    ) {
        return Some(TemplateMatch::new(
            "total_last_7_days",
            format!(
                "SELECT COALESCE(SUM(value), 0) AS answer FROM {t} \
                 WHERE date >= date('now', '-6 days') AND date <= date('now')"
            ),
        ));
    }

    let weekday = has_any(q, &["weekday", "weekdays"]);
    if weekday && has_any(q, &["weekend", "weekends"]) {
        return Some(TemplateMatch::new(
            "weekday_vs_weekend_average",
            format!(
                "SELECT CASE WHEN strftime('%w', date) IN ('0', '6') THEN 'weekend' ELSE 'weekday' END AS day_type, \
                 AVG(value) AS avg_value \
                 FROM {t} GROUP BY day_type ORDER BY day_type"
            ),
        ));
    }

    if weekday || has(q, "day of week") || has(q, "day of the week") {
        return Some(TemplateMatch::new(
            "weekday_average",
            format!(
                "SELECT CAST(strftime('%w', date) AS INTEGER) AS weekday_num, \
                 CASE strftime('%w', date) WHEN '0' THEN 'Sunday' WHEN '1' THEN 'Monday' \
                 WHEN '2' THEN 'Tuesday' WHEN '3' THEN 'Wednesday' WHEN '4' THEN 'Thursday' \
                 WHEN '5' THEN 'Friday' ELSE 'Saturday' END AS weekday, \
                 AVG(value) AS avg_value \
                 FROM {t} GROUP BY weekday_num ORDER BY weekday_num"
            ),
        ));
    }

    let top = top_n_regex().captures(q);
    if top.is_some() || (has_any(q, &["top", "best", "highest"]) && mentions_day(q)) {
        let n = clamp_n(top.as_ref().and_then(|c| c.get(1)).map(|m| m.as_str()));
        return Some(TemplateMatch::new(
            "top_n_days",
            format!("SELECT date, value FROM {t} ORDER BY value DESC, date DESC LIMIT {n}"),
        ));
    }

    let bottom = bottom_n_regex().captures(q);
    if bottom.is_some() || (has_any(q, &["lowest", "worst", "bottom"]) && mentions_day(q)) {
        let n = clamp_n(bottom.as_ref().and_then(|c| c.get(1)).map(|m| m.as_str()));
        return Some(TemplateMatch::new(
            "bottom_n_days",
            format!("SELECT date, value FROM {t} ORDER BY value ASC, date ASC LIMIT {n}"),
        ));
    }

    if has_any(q, &["trend", "trends", "weekly", "last 12 weeks"]) {
        return Some(TemplateMatch::new(
            "weekly_trend_last_12_weeks",
            format!(
                "SELECT date(date, 'weekday 0', '-6 days') AS week_start, SUM(value) AS total \
                 FROM {t} WHERE date >= date('now', '-84 days') \
                 GROUP BY week_start ORDER BY week_start"
            ),
        ));
    }

    if wants_average(q) {
        return Some(TemplateMatch::new(
            "avg_per_day_all_time",
            format!("SELECT COALESCE(AVG(value), 0) AS answer FROM {t}"),
        ));
    }

    if has_any(q, &["total", "sum", "all time"]) {
        return Some(TemplateMatch::new(
            "total_all_time",
            format!("SELECT COALESCE(SUM(value), 0) AS answer FROM {t}"),
        ));
    }

    if has(q, "how many days") {
        return Some(TemplateMatch::new(
            "days_recorded",
            format!("SELECT COUNT(*) AS answer FROM {t}"),
        ));
    }

    None
}
