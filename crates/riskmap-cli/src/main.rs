//! `riskmap`: maintains the country sanctions / risk table.
//!
//! Reads `riskmap.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one subcommand.
//!
//! # Usage
//!
//! ```text
//! riskmap import countries.json
//! riskmap run
//! riskmap run --source fatf-call-for-action --source cpi
//! riskmap show "Myanmar (Burma)"
//! riskmap classify --score 30 --flag EU_ASSET_FREEZE
//! riskmap audit --country Iran --limit 20
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use riskmap_core::{change::Field, country::CountryName, flag::Flag};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "riskmap", author, version, about = "Country sanctions and risk reconciler")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "riskmap.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Bulk-import countries from a JSON array, then classify them.
  Import {
    file: PathBuf,
  },

  /// Fetch the configured sources and reconcile the store.
  Run {
    /// Only run these sources (repeatable).
    #[arg(long = "source", value_name = "NAME")]
    sources: Vec<String>,
  },

  /// Recompute derived labels for every country.
  Reclassify,

  /// Print a country's record and classification.
  Show {
    country: CountryName,
  },

  /// Classify a hypothetical country without touching the store.
  Classify {
    #[arg(long)]
    score:   Option<i64>,
    /// A flag set to YES (repeatable).
    #[arg(long = "flag", value_name = "FLAG")]
    flags:   Vec<Flag>,
    #[arg(long)]
    country: Option<CountryName>,
  },

  /// List recorded changes, newest first.
  Audit {
    #[arg(long)]
    country: Option<CountryName>,
    #[arg(long)]
    field:   Option<Field>,
    #[arg(long = "run", value_name = "RUN_ID")]
    run:     Option<uuid::Uuid>,
    #[arg(long, default_value_t = 100)]
    limit:   usize,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = AppConfig::load(&cli.config)?;

  match cli.command {
    Command::Import { file } => commands::import(&cfg, &file).await,
    Command::Run { sources } => commands::run(&cfg, &sources).await,
    Command::Reclassify => commands::reclassify(&cfg).await,
    Command::Show { country } => commands::show(&cfg, &country).await,
    Command::Classify { score, flags, country } => commands::classify(&cfg, score, &flags, country),
    Command::Audit { country, field, run, limit } => {
      commands::audit(&cfg, commands::change_query(country, field, run, limit)).await
    }
  }
}
