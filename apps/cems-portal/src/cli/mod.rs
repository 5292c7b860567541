//! # CEMS Portal CLI Module
//!
//! This module implements the CLI interface of the portal.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new registry database
//! - `status` - Show registry row counts
//! - `show` - Print the registration of one phone number
//! - `export` - Export every registration as JSON
//! - `compact` - Reclaim free space in the database file

mod commands;

use crate::config::PortalConfig;
use cems_core::CemsError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// CEMS Industry Registration Portal
///
/// Collects industry, stack and CEMS instrument details behind an OTP login
/// and stores them in a single redb file.
#[derive(Parser, Debug)]
#[command(name = "cems-portal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the registry database (overrides config and CEMS_DATABASE)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

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
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty registry database
    Init {
        /// Replace an existing database file
        #[arg(short, long)]
        force: bool,
    },

    /// Show registry row counts
    Status,

    /// Print the registration of one phone number
    Show {
        /// Phone number used at login
        #[arg(long)]
        phone: String,
    },

    /// Export every registration as pretty JSON
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Reclaim free space in the database file
    Compact,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve configuration: file and environment, then global flags.
pub fn resolve_config(cli: &Cli) -> Result<PortalConfig, CemsError> {
    let mut config = PortalConfig::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database.clone_from(database);
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CemsError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Init { force }) => cmd_init(&config.database, force),
        Some(Commands::Status) => cmd_status(&config.database, json_mode),
        Some(Commands::Show { phone }) => cmd_show(&config.database, &phone, json_mode),
        Some(Commands::Export { output }) => cmd_export(&config.database, &output),
        Some(Commands::Compact) => cmd_compact(&config.database),
        None => {
            // No subcommand - show status by default
            cmd_status(&config.database, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
