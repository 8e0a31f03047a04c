//! Error types for Tally.
//!
//! Defines the main error enum used for infrastructure failures. Pipeline
//! outcomes (generation failures, guardrail rejections) have their own
//! taxonomies in `generator` and `safety`.

use thiserror::Error;

/// Main error type for Tally operations.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Embedded store errors (cannot open file, invariant violated on load, etc.)
    #[error("Store error: {0}")]
    Store(String),

    /// Query execution errors reported by the engine (unknown column, syntax, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (unreachable, auth, malformed response, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// A bounded wait expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors (invalid config file, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Creates a store error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store(_) => "Store Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Timeout(_) => "Timeout",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using TallyError.
pub type Result<T> = std::result::Result<T, TallyError>;
