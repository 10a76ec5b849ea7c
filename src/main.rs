use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tributary::config::Config;
use tributary::ingest::{self, SourceStatus};
use tributary::registry::SourceRegistry;
use tributary::storage::{Database, StoreError};

#[derive(Parser, Debug)]
#[command(name = "tributary", about = "Feed ingestion engine")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "tributary.toml", value_name = "FILE")]
    config: PathBuf,

    /// Path to the SQLite database file
    #[arg(long, default_value = "tributary.db", value_name = "FILE")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize (or verify) the database schema. Safe to run repeatedly.
    Setup,
    /// Perform one full ingestion pass over all configured sources.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let db_path = args
        .db
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path).await {
        Ok(db) => db,
        Err(StoreError::Locked) => {
            eprintln!("Error: the database is locked by another process. Please retry once it has finished.");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    match args.command {
        Command::Setup => {
            // Database::open already ran the idempotent migration
            println!("Database ready at {}", args.db.display());
        }
        Command::Run => {
            let config = Config::load(&args.config)
                .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
            let registry =
                SourceRegistry::from_config(&config).context("Invalid source configuration")?;

            let client = reqwest::Client::builder()
                .user_agent(concat!("tributary/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build HTTP client")?;

            let summary = ingest::run_ingestion(&db, &client, &config, &registry)
                .await
                .context("Ingestion run could not complete")?;

            print_summary(&summary);

            // Let an external scheduler spot degraded runs
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &ingest::RunSummary) {
    println!(
        "Ingestion run finished in {}s: {} new, {} updated, {} unchanged",
        summary.finished_at - summary.started_at,
        summary.total_new(),
        summary.total_updated(),
        summary.total_unchanged(),
    );
    for outcome in &summary.outcomes {
        match outcome.status {
            SourceStatus::Ok => println!(
                "  ok      {} (new={}, updated={}, unchanged={}, filtered={})",
                outcome.source, outcome.new, outcome.updated, outcome.unchanged, outcome.filtered
            ),
            SourceStatus::Partial => println!(
                "  partial {} (new={}, updated={}, unchanged={}, filtered={}, skipped={})",
                outcome.source,
                outcome.new,
                outcome.updated,
                outcome.unchanged,
                outcome.filtered,
                outcome.skipped
            ),
            SourceStatus::Failed => println!(
                "  FAILED  {} ({})",
                outcome.source,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
