//! # CEMS Industry Registration Portal
//!
//! The main binary of the portal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/cems-portal (THE BINARY)             │
//! │                                                          │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐  │
//! │  │    CLI      │    │  HTTP API   │    │  Sessions   │  │
//! │  │   (clap)    │    │   (axum)    │    │ (in memory) │  │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘  │
//! │         └──────────────────┼──────────────────┘         │
//! │                            ▼                            │
//! │                    ┌───────────────┐                    │
//! │                    │   cems-core   │                    │
//! │                    │  (THE LOGIC)  │                    │
//! │                    └───────┬───────┘                    │
//! │                            ▼                            │
//! │                      cems.redb file                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! cems-portal server --host 0.0.0.0 --port 8080
//!
//! # Inspect the registry
//! cems-portal status
//! cems-portal show --phone 9999999999
//! cems-portal export -o registrations.json
//! ```

use cems_portal::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CEMS_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("CEMS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cems_portal=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
   ____ _____ __  __ ____
  / ___| ____|  \/  / ___|
 | |   |  _| | |\/| \___ \
 | |___| |___| |  | |___) |
  \____|_____|_|  |_|____/

  Industry Registration Portal v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
