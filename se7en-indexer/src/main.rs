//! se7en indexer entry point
//!
//! Configuration is loaded from environment variables (via .env file).
//! Command-line flags override environment variables.
//!
//! Usage:
//!   se7en-indexer run                 - ingest and reconcile until Ctrl-C
//!   se7en-indexer tick                - one ingestion tick
//!   se7en-indexer reconcile           - one reconciliation pass
//!   se7en-indexer status              - address diagnostics and cursor
//!   se7en-indexer dossier <id>        - verification dossier for an attestation
//!   se7en-indexer arm --note-id ...   - arm a liquidity cycle

use clap::Parser;
use se7en_core::{init_logging, LogConfig, LogFormat, LogLevel};
use se7en_indexer::{handler, Cli};

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    if let Some(format) = cli.log_format.as_deref().and_then(LogFormat::parse) {
        log_config.format = format;
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
