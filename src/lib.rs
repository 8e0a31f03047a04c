//! Tally - ask questions about a daily metric in plain language.
//!
//! A question becomes one candidate SQL query (from a remote model or the
//! built-in templates), the guard checks it, and only an accepted query runs
//! against the embedded store. This library exposes the pipeline for the
//! `tally` binary and for integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod query;
pub mod safety;

pub use orchestrator::{Orchestrator, Outcome, PipelineConfig, PipelineStage, ResponseBundle};
