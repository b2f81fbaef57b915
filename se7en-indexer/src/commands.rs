//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// se7en chain indexer
#[derive(Parser, Debug)]
#[command(name = "se7en-indexer")]
#[command(version)]
#[command(about = "Chain event ingestion and cycle reconciliation for the se7en contracts")]
#[command(long_about = "Polls the se7en contract modules for events, stores them exactly once \
    behind a durable cursor, and reconciles armed liquidity cycles against on-chain \
    confirmations.\n\nSettings are read from SE7EN_* environment variables and an optional \
    .env file; flags override them.")]
pub struct Cli {
    /// Sled data directory; omit to keep state in memory (env: SE7EN_DATA_DIR)
    #[arg(long, env = "SE7EN_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Use the in-memory stub deployment instead of the RPC node
    #[arg(long, global = true)]
    pub stub: bool,

    /// Log format (pretty, json, compact)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run ingestion and reconciliation until Ctrl-C
    Run,
    /// Run one ingestion tick
    Tick,
    /// Run one reconciliation pass
    Reconcile,
    /// Show address diagnostics, cursor and store counts
    Status,
    /// Print the verification dossier of an attestation
    Dossier {
        /// Attestation id (0x-prefixed bytes32)
        attestation_id: String,
    },
    /// Arm a liquidity cycle on a note
    Arm {
        /// Note id
        #[arg(long)]
        note_id: u64,
        /// Tenor in days
        #[arg(long)]
        tenor_days: u16,
        /// Rate in basis points
        #[arg(long)]
        rate_bps: u16,
    },
}
