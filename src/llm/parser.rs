//! Response parsing for LLM outputs.
//!
//! Pulls the SQL statement out of a chat completion that may echo the prompt,
//! wrap the query in a markdown code block, or surround it with prose.

use std::sync::OnceLock;

use regex::Regex;

use crate::safety::FORBIDDEN_KEYWORDS;

/// Words that can open a SQL statement besides the deny-listed ones.
const STATEMENT_STARTERS: &[&str] = &["SELECT", "WITH", "VALUES", "EXPLAIN", "REPLACE"];

/// Extracts the SQL statement from a model response.
///
/// In order:
/// - a leading echo of `prompt` is removed
/// - the first ```` ```sql ```` block is used, else the first bare ```` ``` ```` block
/// - text that already starts with a statement keyword is kept whole
/// - otherwise leading prose is dropped up to the first `SELECT`, or a
///   `WITH name AS (` clause
///
/// Returns `None` when no statement can be found.
pub fn extract_sql(response: &str, prompt: &str) -> Option<String> {
    let mut text = response.trim();
    let echo = prompt.trim();
    if !echo.is_empty() {
        if let Some(rest) = text.strip_prefix(echo) {
            text = rest.trim();
        }
    }

    if let Some(block) = extract_code_block(text, "sql").or_else(|| extract_code_block(text, "")) {
        let block = block.trim();
        return (!block.is_empty()).then(|| block.to_string());
    }

    let text = text.trim_end_matches("```").trim();
    if starts_with_statement(text) {
        return Some(text.to_string());
    }

    let start = keyword_regex().find(text)?.start();
    Some(text[start..].trim().to_string())
}

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bselect\b|\bwith\s+(?:recursive\s+)?[\w"]+\s*(?:\([^)]*\)\s*)?as\s*\("#)
            .expect("valid keyword regex")
    })
}

fn starts_with_statement(text: &str) -> bool {
    let first: String = text
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    !first.is_empty()
        && STATEMENT_STARTERS
            .iter()
            .chain(FORBIDDEN_KEYWORDS)
            .any(|k| k.eq_ignore_ascii_case(&first))
}

/// Extracts content from a markdown code block with the specified language.
///
/// Pass an empty string for `lang` to match blocks without a language specifier.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("```") {
        let fence = search_from + offset;
        let after_fence = fence + 3;
        let line_end = text[after_fence..]
            .find('\n')
            .map(|i| after_fence + i)
            .unwrap_or(text.len());
        let tag = lower[after_fence..line_end].trim();

        if tag == lang {
            let content_start = (line_end + 1).min(text.len());
            let end = text[content_start..]
                .find("```")
                .map(|i| content_start + i)
                .unwrap_or(text.len());
            return Some(text[content_start..end].to_string());
        }

        // Skip past this fence's info string and keep looking.
        search_from = line_end;
    }

    None
}
