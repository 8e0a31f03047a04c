//! Command-line argument parsing for Tally.
//!
//! The CLI is a thin presentation layer over the library: it resolves where
//! the store and config live, then hands over to the orchestrator.

use crate::config::{Config, StoreConfig};
use crate::db::{DummyConfig, MAX_DAYS};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary, SQL and result table.
    #[default]
    Text,
    /// The full response bundle as JSON.
    Json,
}

/// Ask questions about a daily metric in plain language.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Database file (defaults to the platform data directory)
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Use a throwaway in-memory store seeded with synthetic data
    #[arg(long, global = true, conflicts_with = "db")]
    pub memory: bool,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Answer a question about the dataset
    Ask {
        /// The question, in plain language
        #[arg(required = true, num_args = 1.., value_name = "QUESTION")]
        question: Vec<String>,

        /// Skip the remote model and use the built-in templates only
        #[arg(long)]
        templates_only: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Replace the dataset with a synthetic series
    InitDummy {
        /// Number of days to generate
        #[arg(
            long,
            default_value_t = 180,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DAYS))
        )]
        days: u32,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First day (YYYY-MM-DD); defaults to ending today
        #[arg(long, value_name = "DATE", value_parser = parse_date)]
        start_date: Option<NaiveDate>,
    },

    /// Show what the store currently holds
    Status,

    /// Print the schema exposed to questions
    Schema,

    /// Run the guardrail on a SQL string without executing it
    Check {
        /// The SQL text to validate
        sql: String,
    },
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date: '{s}'. Expected YYYY-MM-DD"))
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the store file, CLI flag first, then config, then the default.
    pub fn store_path(&self, store: &StoreConfig) -> PathBuf {
        self.db.clone().unwrap_or_else(|| store.resolved_path())
    }
}

impl Command {
    /// Joins a multi-word question back into one string.
    pub fn question(&self) -> Option<String> {
        match self {
            Self::Ask { question, .. } => Some(question.join(" ")),
            _ => None,
        }
    }

    /// Synthetic-data parameters for `init-dummy`.
    pub fn dummy_config(&self) -> Option<DummyConfig> {
        match self {
            Self::InitDummy {
                days,
                seed,
                start_date,
            } => Some(DummyConfig {
                days: *days,
                seed: *seed,
                start_date: *start_date,
            }),
            _ => None,
        }
    }
}
