//! Query generation: question text to one candidate SQL string.
//!
//! Two interchangeable strategies sit behind [`QueryGenerator`]: a remote
//! model reached through [`LlmClient`], and the deterministic
//! [`TemplateGenerator`]. Generated SQL is never trusted; it always goes
//! through the guard next.

mod templates;

pub use templates::{normalize, TemplateGenerator, TemplateMatch, DEFAULT_TOP_N, MAX_TOP_N};

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::SchemaDescriptor;
use crate::error::TallyError;
use crate::llm::{build_messages, extract_sql, LlmClient};

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Remote,
    Template,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// A generated, not yet validated, SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateQuery {
    pub sql: String,
    pub strategy: Strategy,
    /// Template rule name, for template candidates.
    pub matched_rule: Option<String>,
}

/// Why a strategy could not produce a candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GenerationError {
    /// The question was blank.
    #[error("question is empty")]
    EmptyQuestion,

    /// The remote model could not be reached or returned no usable statement.
    #[error("generation unavailable: {0}")]
    Unavailable(String),

    /// The remote model did not answer within the bounded wait.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// No template pattern matches the question.
    #[error("no template matches the question")]
    NoTemplateMatch,
}

impl GenerationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "empty_question",
            Self::Unavailable(_) => "generation_unavailable",
            Self::Timeout(_) => "generation_timeout",
            Self::NoTemplateMatch => "no_template_match",
        }
    }
}

/// Remote strategy: asks a model for SQL given the schema and question.
#[derive(Clone)]
pub struct RemoteGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl fmt::Debug for RemoteGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteGenerator")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    /// Sends schema and question (never row data) and extracts the SQL.
    pub async fn generate(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
    ) -> Result<CandidateQuery, GenerationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(GenerationError::EmptyQuestion);
        }

        let messages = build_messages(schema, question);
        debug!(model = %self.model, timeout = ?self.timeout, "Requesting SQL from remote model");

        let request = self.client.complete(&self.model, &messages);
        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(TallyError::Timeout(_))) => return Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                warn!(error = %e, "Remote generation failed");
                return Err(GenerationError::Unavailable(e.to_string()));
            }
            Ok(Ok(text)) => text,
        };

        let system_prompt = messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let sql = extract_sql(&response, system_prompt).ok_or_else(|| {
            GenerationError::Unavailable("response contained no SQL statement".to_string())
        })?;

        Ok(CandidateQuery {
            sql,
            strategy: Strategy::Remote,
            matched_rule: None,
        })
    }
}

/// The generation capability, as a closed set of strategies.
#[derive(Debug, Clone)]
pub enum QueryGenerator {
    Remote(RemoteGenerator),
    Template(TemplateGenerator),
}

impl QueryGenerator {
    /// Which strategy this generator uses.
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Remote(_) => Strategy::Remote,
            Self::Template(_) => Strategy::Template,
        }
    }

    /// Maps a question to one candidate query.
    pub async fn generate(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
    ) -> Result<CandidateQuery, GenerationError> {
        match self {
            Self::Remote(remote) => remote.generate(question, schema).await,
            Self::Template(templates) => {
                if question.trim().is_empty() {
                    return Err(GenerationError::EmptyQuestion);
                }
                let matched = templates
                    .route(question)
                    .ok_or(GenerationError::NoTemplateMatch)?;
                debug!(rule = matched.rule, "Template matched");
                Ok(CandidateQuery {
                    sql: matched.sql,
                    strategy: Strategy::Template,
                    matched_rule: Some(matched.rule.to_string()),
                })
            }
        }
    }
}
