//! # tagstore CLI Module
//!
//! This module implements the CLI interface for tagstore.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store status
//! - `init` - Initialize an empty store
//! - `ingest` - Upsert records from a JSON file
//! - `export` - Write an export (json, csv, failures) to a file
//! - `count` - Show local and remote counts
//! - `reconcile` - Push every local record to the remote mirror

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagstore_core::TagError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// tagstore - tag persistence for crowdsourced image tagging
///
/// Keeps one record per image, mirrors writes to a remote store when
/// configured, and exports the results as JSON or CSV.
#[derive(Parser, Debug)]
#[command(name = "tagstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (default: ./tagstore.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config and TAGSTORE_STORE_DIR)
    #[arg(short = 'S', long, global = true)]
    pub store: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show store status
    Status,

    /// Initialize an empty store
    Init {
        /// Clear an existing store
        #[arg(short, long)]
        force: bool,
    },

    /// Upsert records from a JSON file (array of records)
    Ingest {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export the store to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, csv, failures)
        #[arg(short = 't', long, default_value = "json")]
        format: String,
    },

    /// Show record counts
    Count {
        /// Also count records for this uid
        #[arg(short, long)]
        uid: Option<String>,
    },

    /// Mirror every local record to the remote store
    Reconcile,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TagError> {
    let config = Config::load(cli.config.as_deref())?.with_store_dir(cli.store);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&config, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&config, json_mode).await,
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Ingest { file }) => cmd_ingest(&config, json_mode, &file).await,
        Some(Commands::Export { output, format }) => {
            cmd_export(&config, json_mode, &output, &format).await
        }
        Some(Commands::Count { uid }) => cmd_count(&config, json_mode, uid.as_deref()).await,
        Some(Commands::Reconcile) => cmd_reconcile(&config, json_mode).await,
    }
}
