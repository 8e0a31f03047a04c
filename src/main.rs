//! Tally - ask questions about a daily metric in plain language.

use std::process::ExitCode;
use std::sync::Arc;

use db_tally::cli::{Cli, Command, OutputFormat};
use db_tally::config::Config;
use db_tally::db::{
    generate_daily_metrics, DataSource, DatabaseClient, DummyConfig, MetricStore, QueryResult,
    SchemaDescriptor,
};
use db_tally::error::{Result, TallyError};
use db_tally::llm::create_client;
use db_tally::logging::{init_file_logging, init_stderr_logging};
use db_tally::safety::{SqlGuard, Verdict};
use db_tally::{Orchestrator, Outcome, ResponseBundle};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        init_file_logging();
    } else {
        init_stderr_logging();
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load(&config_path)?;

    match &cli.command {
        Command::Schema => {
            print!("{}", SchemaDescriptor::curated().format_for_llm());
            return Ok(ExitCode::SUCCESS);
        }
        Command::Check { sql } => return Ok(check(sql)),
        _ => {}
    }

    let store = open_store(&cli, &config).await?;

    let code = match &cli.command {
        Command::Ask {
            templates_only,
            format,
            ..
        } => {
            let question = cli.command.question().unwrap_or_default();
            let bundle = ask(&config, store.clone(), &question, *templates_only).await?;
            print_bundle(&bundle, *format)?;
            if bundle.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Command::InitDummy { .. } => {
            let cfg = cli.command.dummy_config().unwrap_or_default();
            let rows = generate_daily_metrics(&cfg);
            let loaded = store
                .replace_all(
                    &rows,
                    DataSource::Synthetic {
                        days: cfg.days,
                        seed: cfg.seed,
                    },
                )
                .await?;
            match store.path() {
                Some(path) => println!("Loaded {loaded} rows into {}", path.display()),
                None => println!("Loaded {loaded} rows"),
            }
            ExitCode::SUCCESS
        }
        Command::Status => {
            let status = store.status().await?;
            println!("Rows:    {}", status.row_count);
            if let (Some(first), Some(last)) = (&status.first_date, &status.last_date) {
                println!("Range:   {first} .. {last}");
            }
            match (&status.source_type, &status.source_detail) {
                (Some(kind), Some(detail)) => println!("Source:  {kind} ({detail})"),
                (Some(kind), None) => println!("Source:  {kind}"),
                _ => println!("Source:  none"),
            }
            if let Some(updated) = status.last_updated {
                println!("Updated: {}", updated.to_rfc3339());
            }
            ExitCode::SUCCESS
        }
        Command::Schema | Command::Check { .. } => ExitCode::SUCCESS,
    };

    store.close().await?;
    Ok(code)
}

async fn open_store(cli: &Cli, config: &Config) -> Result<Arc<MetricStore>> {
    let query_timeout = config.store.query_timeout()?;
    let store = if cli.memory {
        let cfg = DummyConfig::default();
        let rows = generate_daily_metrics(&cfg);
        MetricStore::in_memory_with(
            &rows,
            DataSource::Synthetic {
                days: cfg.days,
                seed: cfg.seed,
            },
        )
        .await?
    } else {
        MetricStore::open(&cli.store_path(&config.store)).await?
    };
    Ok(Arc::new(store.with_query_timeout(query_timeout)))
}

async fn ask(
    config: &Config,
    store: Arc<MetricStore>,
    question: &str,
    templates_only: bool,
) -> Result<ResponseBundle> {
    if !store.status().await?.has_data() {
        warn!("The store is empty; run `tally init-dummy` to load a synthetic dataset");
    }

    let pipeline = config.pipeline_config(templates_only)?;
    let llm = if pipeline.remote_capability_configured {
        Some(create_client(&config.llm)?)
    } else {
        if !templates_only {
            info!("No remote model configured; answering from templates");
        }
        None
    };

    let orchestrator = Orchestrator::new(pipeline, store, llm);
    Ok(orchestrator.answer(question).await)
}

fn check(sql: &str) -> ExitCode {
    match SqlGuard::new(SchemaDescriptor::curated()).validate(sql) {
        Verdict::Accepted(_) => {
            println!("accepted");
            ExitCode::SUCCESS
        }
        Verdict::Rejected(reason) => {
            println!("rejected: {} ({reason})", reason.code());
            ExitCode::from(2)
        }
    }
}

fn print_bundle(bundle: &ResponseBundle, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(bundle)
            .map_err(|e| TallyError::internal(format!("Failed to serialize response: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    println!("Question: {}", bundle.question);
    if let Some(sql) = &bundle.sql_text {
        let source = match (&bundle.strategy, &bundle.matched_rule) {
            (Some(strategy), Some(rule)) => format!("{strategy}: {rule}"),
            (Some(strategy), None) => strategy.to_string(),
            _ => "unknown".to_string(),
        };
        println!("SQL ({source}):\n  {sql}");
    }

    match &bundle.outcome {
        Outcome::Succeeded(result) => {
            if let Some(summary) = &bundle.summary {
                println!("{summary}");
            }
            if result.scalar("answer").is_none() {
                print_table(result);
            }
        }
        Outcome::Rejected(reason) => println!("Rejected: {} ({reason})", reason.code()),
        Outcome::ExecutionFailed(message) => println!("Execution failed: {message}"),
        Outcome::GenerationFailed(errors) => {
            println!("Could not turn the question into a query:");
            for e in errors {
                println!("  - {e}");
            }
        }
    }
    Ok(())
}

fn print_table(result: &QueryResult) {
    if result.columns.is_empty() {
        return;
    }
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(String::len)
                .chain(std::iter::once(name.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!("{}", format_row(&header, &widths));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", format_row(&cells, &widths));
    }
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
}
