//! Query execution for Tally.
//!
//! Isolates running guard-approved SQL from the orchestrator.

pub mod executor;

pub use executor::{QueryExecutor, QueryOutcome};
