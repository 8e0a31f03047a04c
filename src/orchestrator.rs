//! One question in, one response bundle out.
//!
//! The orchestrator drives a single pass through generation, validation and
//! execution:
//!
//! ```text
//! Received -> Generating -> Validating -> Executing -> Succeeded | Failed
//!                  |             |
//!                  |             +-> Rejected
//!                  +-> GenerationFailed
//! ```
//!
//! Generator failures fall back to the template strategy. Guard rejections
//! and execution failures are terminal and are never retried with a
//! different query. Every bundle carries the generated SQL, if any.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{DatabaseClient, QueryResult, SchemaDescriptor};
use crate::error::TallyError;
use crate::generator::{
    CandidateQuery, GenerationError, QueryGenerator, RemoteGenerator, Strategy, TemplateGenerator,
};
use crate::llm::huggingface::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::llm::LlmClient;
use crate::query::QueryExecutor;
use crate::safety::{RejectReason, SqlGuard, Verdict};

/// Column name a scalar answer is expected under.
const ANSWER_COLUMN: &str = "answer";

/// Settings the pipeline runs with, resolved once by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Whether a remote model should be tried before the templates.
    pub remote_capability_configured: bool,
    /// Model identifier sent with remote requests.
    pub remote_model_identifier: String,
    /// Upper bound on one remote generation request.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remote_capability_configured: false,
            remote_model_identifier: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Generating,
    Validating,
    Executing,
    Succeeded,
    Failed,
    Rejected,
    GenerationFailed,
}

impl PipelineStage {
    /// Returns true once the request can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Rejected | Self::GenerationFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a request ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The query ran; rows are in engine order.
    Succeeded(QueryResult),
    /// The guard refused the generated query.
    Rejected(RejectReason),
    /// The engine reported an error, verbatim.
    ExecutionFailed(String),
    /// Every strategy failed, in the order they were tried.
    GenerationFailed(Vec<GenerationError>),
}

impl Outcome {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "succeeded",
            Self::Rejected(reason) => reason.code(),
            Self::ExecutionFailed(_) => "execution_failed",
            Self::GenerationFailed(_) => "generation_failed",
        }
    }

    fn stage(&self) -> PipelineStage {
        match self {
            Self::Succeeded(_) => PipelineStage::Succeeded,
            Self::Rejected(_) => PipelineStage::Rejected,
            Self::ExecutionFailed(_) => PipelineStage::Failed,
            Self::GenerationFailed(_) => PipelineStage::GenerationFailed,
        }
    }
}

/// Everything the presentation layer needs to show one answer.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseBundle {
    pub question: String,
    /// Generated SQL, shown whether or not it ran.
    pub sql_text: Option<String>,
    pub strategy: Option<Strategy>,
    pub matched_rule: Option<String>,
    pub outcome: Outcome,
    /// Human-readable summary of a successful result.
    pub summary: Option<String>,
    pub stage: PipelineStage,
}

impl ResponseBundle {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded(_))
    }

    /// Returns the result set of a successful request.
    pub fn result(&self) -> Option<&QueryResult> {
        match &self.outcome {
            Outcome::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    fn new(question: &str, candidate: Option<CandidateQuery>, outcome: Outcome) -> Self {
        let summary = match &outcome {
            Outcome::Succeeded(result) => Some(summarize(result)),
            _ => None,
        };
        let (sql_text, strategy, matched_rule) = match candidate {
            Some(c) => (Some(c.sql), Some(c.strategy), c.matched_rule),
            None => (None, None, None),
        };
        Self {
            question: question.to_string(),
            sql_text,
            strategy,
            matched_rule,
            stage: outcome.stage(),
            outcome,
            summary,
        }
    }
}

/// Builds the one-line summary for a result set.
pub fn summarize(result: &QueryResult) -> String {
    let mut summary = match result.scalar(ANSWER_COLUMN) {
        Some(value) => format!("Answer: {value}"),
        None if result.row_count == 1 => "1 row returned".to_string(),
        None => format!("{} rows returned", result.row_count),
    };
    if let Some(warning) = result.truncation_warning() {
        summary.push_str(". ");
        summary.push_str(&warning);
    }
    summary
}

/// Drives question-to-answer requests against one store.
pub struct Orchestrator {
    config: PipelineConfig,
    db: Arc<dyn DatabaseClient>,
    llm: Option<Arc<dyn LlmClient>>,
    schema: &'static SchemaDescriptor,
    guard: SqlGuard,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// `llm` is only used when `config.remote_capability_configured` is set.
    pub fn new(
        config: PipelineConfig,
        db: Arc<dyn DatabaseClient>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let schema = SchemaDescriptor::curated();
        if config.remote_capability_configured && llm.is_none() {
            warn!("Remote generation configured without a client; using templates only");
        }
        Self {
            config,
            db,
            llm,
            schema,
            guard: SqlGuard::new(schema),
        }
    }

    /// Strategies to try, in order.
    fn generators(&self) -> Vec<QueryGenerator> {
        let mut generators = Vec::with_capacity(2);
        if self.config.remote_capability_configured {
            if let Some(client) = &self.llm {
                generators.push(QueryGenerator::Remote(RemoteGenerator::new(
                    Arc::clone(client),
                    self.config.remote_model_identifier.clone(),
                    self.config.request_timeout,
                )));
            }
        }
        generators.push(QueryGenerator::Template(TemplateGenerator::new()));
        generators
    }

    /// Answers one question in a single pass.
    pub async fn answer(&self, question: &str) -> ResponseBundle {
        let mut stage = PipelineStage::Received;
        debug!(question = %question, "Question received");

        advance(&mut stage, PipelineStage::Generating);
        let candidate = match self.generate(question).await {
            Ok(candidate) => candidate,
            Err(errors) => {
                let codes: Vec<_> = errors.iter().map(GenerationError::code).collect();
                warn!(errors = ?codes, "No strategy produced a query");
                return self.finish(question, None, Outcome::GenerationFailed(errors));
            }
        };

        advance(&mut stage, PipelineStage::Validating);
        let accepted = match self.guard.validate(&candidate.sql) {
            Verdict::Accepted(query) => query,
            Verdict::Rejected(reason) => {
                return self.finish(question, Some(candidate), Outcome::Rejected(reason));
            }
        };

        advance(&mut stage, PipelineStage::Executing);
        let executor = QueryExecutor::new(self.db.as_ref());
        let outcome = match executor.execute(&accepted).await {
            Ok(outcome) => Outcome::Succeeded(outcome.result),
            Err(TallyError::Query(message)) => Outcome::ExecutionFailed(message),
            Err(e) => Outcome::ExecutionFailed(e.to_string()),
        };

        self.finish(question, Some(candidate), outcome)
    }

    /// Tries each strategy until one yields a candidate.
    async fn generate(
        &self,
        question: &str,
    ) -> std::result::Result<CandidateQuery, Vec<GenerationError>> {
        let mut errors = Vec::new();

        for generator in self.generators() {
            match generator.generate(question, self.schema).await {
                Ok(candidate) => {
                    debug!(
                        strategy = %candidate.strategy,
                        rule = candidate.matched_rule.as_deref().unwrap_or("-"),
                        sql = %candidate.sql,
                        "Candidate generated"
                    );
                    return Ok(candidate);
                }
                Err(GenerationError::EmptyQuestion) => {
                    return Err(vec![GenerationError::EmptyQuestion]);
                }
                Err(e) => {
                    info!(strategy = %generator.strategy(), error = %e, "Strategy failed, falling back");
                    errors.push(e);
                }
            }
        }

        Err(errors)
    }

    fn finish(
        &self,
        question: &str,
        candidate: Option<CandidateQuery>,
        outcome: Outcome,
    ) -> ResponseBundle {
        let bundle = ResponseBundle::new(question, candidate, outcome);
        match &bundle.outcome {
            Outcome::Succeeded(result) => info!(
                rows = result.row_count,
                strategy = ?bundle.strategy,
                "Question answered"
            ),
            other => warn!(
                outcome = other.code(),
                sql = bundle.sql_text.as_deref().unwrap_or(""),
                "Question not answered"
            ),
        }
        bundle
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}
