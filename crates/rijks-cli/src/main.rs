//! rijks-harvest CLI - builds and maintains a queryable offline knowledge
//! base of the Rijksmuseum collection.
//!
//! # Usage
//!
//! ```bash
//! # Harvest everything from scratch
//! rijks-harvest harvest
//!
//! # Resume an interrupted harvest
//! rijks-harvest harvest --resume
//!
//! # Normalize the ingest-shape store into the narrow surrogate-id shape
//! rijks-harvest normalize
//!
//! # Run geocoding phase 1a only
//! rijks-harvest geocode --phase 1a
//!
//! # Embed every artwork missing a vector
//! rijks-harvest embed
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod progress;

/// rijks-harvest - builds an offline SQLite knowledge base of the Rijksmuseum collection
#[derive(Parser, Debug)]
#[command(name = "rijks-harvest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "RIJKS_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Override the SQLite store path
    #[arg(long, global = true, env = "RIJKS_DB_PATH")]
    db_path: Option<std::path::PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Number of concurrent dispatcher workers
    #[arg(long, global = true)]
    threads: Option<usize>,
}

impl GlobalOptions {
    /// Convert global options to config overrides.
    pub fn to_config_overrides(&self) -> rijks_config::ConfigOverrides {
        rijks_config::ConfigOverrides {
            db_path: self.db_path.clone(),
            threads: self.threads,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run (or resume) the harvest phases: bulk N-Triples seed, OAI-PMH
    /// sets and records, vocabulary and person-name resolution, Tier-2
    /// artwork enrichment
    Harvest(commands::harvest::HarvestArgs),

    /// Rewrite the ingest-shape store into the narrow surrogate-id shape,
    /// rebuild FTS and import a geocoding review CSV
    Normalize(commands::normalize::NormalizeArgs),

    /// Resolve coordinates for the `place` vocabulary across all geocoding
    /// sub-phases
    Geocode(commands::geocode::GeocodeArgs),

    /// Encode artwork composite texts and write them to the embeddings and
    /// KNN tables
    Embed(commands::embed::EmbedArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Harvest(args) => commands::harvest::execute(args, cli.global).await,
        Commands::Normalize(args) => commands::normalize::execute(args, cli.global).await,
        Commands::Geocode(args) => commands::geocode::execute(args, cli.global).await,
        Commands::Embed(args) => commands::embed::execute(args, cli.global).await,
    }
}
