//! `huddle` command-line entry point.
//!
//! # Responsibility
//! - Parse flags (with environment fallbacks) and initialize logging.
//! - Hand the document to `huddle_core` and report per-action outcomes.
//!
//! Exit code is non-zero whenever any action fails.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod apply;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(author, version, about = "Apply scheduling action documents to a local store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, global = true, env = "HUDDLE_LOG")]
    log_level: Option<String>,

    /// Absolute directory for rotating log files (stderr when unset)
    #[arg(long, global = true, env = "HUDDLE_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an action document to the store
    Apply {
        /// Document path, or `-` for standard input
        #[arg(default_value = "-")]
        file: PathBuf,

        /// Path to the SQLite store file
        #[arg(long, env = "HUDDLE_DB", default_value = "huddle.db")]
        db: PathBuf,

        /// Zone for actions without `use_tz` (default: local zone)
        #[arg(long, env = "HUDDLE_TZ")]
        tz: Option<String>,

        /// Roll back the whole batch when any action fails
        #[arg(long)]
        atomic: bool,

        /// Print outcomes as JSON instead of one line per action
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level
            .clone()
            .unwrap_or_else(|| huddle_core::default_log_level().to_string())
    };
    huddle_core::init_logging(&level, cli.log_dir.as_deref()).map_err(|err| anyhow!(err))?;

    match cli.command {
        Commands::Apply {
            file,
            db,
            tz,
            atomic,
            json,
        } => apply::execute(apply::ApplyArgs {
            file,
            db,
            tz,
            atomic,
            json,
        }),
    }
}
