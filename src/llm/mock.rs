//! Mock LLM client for testing and offline demos.
//!
//! Provides deterministic responses based on input patterns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TallyError};
use crate::llm::types::{last_user_content, Message};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked in order.
    custom_responses: Vec<(String, String)>,
    /// Returned when no pattern matches, instead of the built-in answers.
    fallback: Option<String>,
    /// Simulated latency before answering.
    delay: Option<Duration>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    last_model: Arc<Mutex<Option<String>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern` (case-insensitive), the mock
    /// returns `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Answers every unmatched question with `response`.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every call fail with an LLM error carrying `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of completions requested so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model identifier passed to the most recent completion.
    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().ok().and_then(|m| m.clone())
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if let Some(fallback) = &self.fallback {
            return fallback.clone();
        }

        if input_lower.contains("average") || input_lower.contains("mean") {
            return "```sql\nSELECT AVG(value) AS answer FROM daily_metric;\n```".to_string();
        }

        if input_lower.contains("how many days") {
            return "SELECT COUNT(*) AS answer FROM daily_metric".to_string();
        }

        if input_lower.contains("total") || input_lower.contains("sum") {
            return "```sql\nSELECT COALESCE(SUM(value), 0) AS answer FROM daily_metric;\n```"
                .to_string();
        }

        if input_lower.contains("best") || input_lower.contains("top") {
            return "```sql\nSELECT date, value FROM daily_metric ORDER BY value DESC LIMIT 10;\n```"
                .to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_model.lock() {
            *last = Some(model.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(TallyError::llm(message.clone()));
        }

        Ok(self.mock_response(last_user_content(messages)))
    }
}
