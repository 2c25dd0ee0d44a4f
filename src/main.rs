//! # readsync CLI
//!
//! ```bash
//! readsync [--config ./config/readsync.toml] <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `readsync sync` | Mirror tagged documents into the bitable |
//! | `readsync preview` | Fetch and print mapped records, no writes |
//! | `readsync check` | Show configuration status, no network |
//!
//! Settings can be given entirely through environment variables; see
//! `config/readsync.example.toml` for the file format.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use readsync::config::{self, Requirement};
use readsync::sync::{parse_since, SyncOptions};
use readsync::{check, preview, sync};

const DEFAULT_CONFIG: &str = "./config/readsync.toml";

/// readsync — mirror tagged Readwise Reader documents and highlights into a
/// Feishu Bitable.
#[derive(Parser)]
#[command(
    name = "readsync",
    about = "Mirror tagged Readwise Reader documents and highlights into a Feishu Bitable",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/readsync.toml`; a missing default file is
    /// ignored and settings are read from the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch tagged documents and insert or update bitable rows.
    ///
    /// Rows are matched by source URL. New URLs are inserted; rows whose
    /// highlights changed get their highlight column rewritten. Nothing is
    /// deleted.
    Sync {
        /// Compute inserts and updates without writing.
        #[arg(long)]
        dry_run: bool,

        /// Ignore `source.lookback_hours` and `--since`; fetch every tagged document.
        #[arg(long)]
        full: bool,

        /// Only fetch documents modified after this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of documents to consider.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Fetch documents and print the records that would be written.
    Preview {
        /// Only fetch documents modified after this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of documents to show.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show which settings are present. Makes no network calls.
    Check,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("readsync=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };

    match cli.command {
        Commands::Sync {
            dry_run,
            full,
            since,
            limit,
        } => {
            let cfg = config::load_config(&path, explicit, Requirement::Full)?;
            let opts = SyncOptions {
                dry_run,
                full,
                since: since.as_deref().map(parse_since).transpose()?,
                limit,
            };
            sync::run_sync(&cfg, &opts).await?;
        }
        Commands::Preview { since, limit } => {
            let cfg = config::load_config(&path, explicit, Requirement::Source)?;
            let opts = SyncOptions {
                since: since.as_deref().map(parse_since).transpose()?,
                limit: Some(limit),
                ..Default::default()
            };
            preview::run_preview(&cfg, &opts).await?;
        }
        Commands::Check => {
            let cfg = config::load_config(&path, explicit, Requirement::Inspect)?;
            check::run_check(&cfg)?;
        }
    }

    Ok(())
}
