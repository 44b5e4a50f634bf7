//! # Tender Harvest CLI (`tenders`)
//!
//! ## Usage
//!
//! ```bash
//! tenders --config ./config/tenders.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tenders init` | Create the SQLite database and run schema migrations |
//! | `tenders sources` | List configured sources and whether they are registered |
//! | `tenders run` | Harvest all (or selected) sources |
//! | `tenders classify "<title>"` | Show the taxonomy decision for a title |
//! | `tenders score "<text>"` | Show the relevance gate's scores for a text |
//! | `tenders recategorize` | Re-run the classifier over stored tenders |
//! | `tenders list` | List stored tenders with filters |
//! | `tenders categories` | List category keys and display names |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tender_harvest::list::ListArgs;
use tender_harvest::{config, ingest, inspect, list, migrate, recategorize, sources};

/// Tender Harvest: procurement tender harvesting with a semantic relevance gate.
#[derive(Parser)]
#[command(
    name = "tenders",
    about = "Harvest, filter, classify and deduplicate public procurement tenders",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tenders.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; safe to run repeatedly.
    Init,

    /// List configured sources.
    Sources,

    /// Run one ingestion cycle.
    ///
    /// Sources are processed sequentially in config order. A failing source
    /// is reported and skipped; only an unreachable database aborts the run.
    Run {
        /// Only run these source slugs (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Classify a tender title with the keyword taxonomy.
    Classify {
        title: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Score a text with the relevance gate.
    Score {
        text: String,

        #[arg(long)]
        json: bool,
    },

    /// Re-run the classifier over all stored tenders.
    Recategorize {
        /// Report changes without writing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored tenders, newest publication first.
    List {
        /// Case-insensitive text search over title and description.
        #[arg(long)]
        query: Option<String>,

        /// Filter by source slug.
        #[arg(long)]
        source: Option<String>,

        /// Published on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Published on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Filter by category key.
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value = "50")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,

        #[arg(long)]
        json: bool,
    },

    /// List category keys and display names.
    Categories,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tender_harvest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Run { sources, json } => {
            ingest::run_ingest(&cfg, &sources, json).await?;
        }
        Commands::Classify { title, description } => {
            inspect::run_classify(&cfg, &title, description.as_deref())?;
        }
        Commands::Score { text, json } => {
            inspect::run_score(&cfg, &text, json).await?;
        }
        Commands::Recategorize { dry_run } => {
            recategorize::run_recategorize(&cfg, dry_run).await?;
        }
        Commands::List {
            query,
            source,
            since,
            until,
            category,
            limit,
            offset,
            json,
        } => {
            let args = ListArgs {
                query,
                source,
                since,
                until,
                category,
                limit,
                offset,
            };
            list::run_list(&cfg, &args, json).await?;
        }
        Commands::Categories => {
            inspect::run_categories(&cfg)?;
        }
    }

    Ok(())
}
