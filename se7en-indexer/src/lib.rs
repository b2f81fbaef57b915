//! se7en indexer
//!
//! Long-running service around the se7en contract modules:
//!
//! - [`EventSubscriber`] polls contract logs behind a durable cursor and
//!   stores each decoded event exactly once.
//! - [`CycleReconciler`] moves ARMED cycles to EXECUTED once their
//!   on-chain confirmation has been ingested.
//! - [`CycleArming`] runs a cycle on-chain and records the attempt.
//! - [`fetch_verification_dossier`] assembles the evidence behind an
//!   attestation.
//! - [`BackgroundRunner`] schedules ingestion and reconciliation on
//!   independent, non-overlapping timers.
//!
//! # Usage
//!
//! ```text
//! se7en-indexer [OPTIONS] <COMMAND>
//!
//! Commands:
//!   run        Run ingestion and reconciliation until Ctrl-C
//!   tick       Run one ingestion tick
//!   reconcile  Run one reconciliation pass
//!   status     Show address diagnostics, cursor and store counts
//!   dossier    Print the verification dossier of an attestation
//!   arm        Arm a liquidity cycle on a note
//!
//! Options:
//!       --data-dir <DIR>       Sled data directory [env: SE7EN_DATA_DIR]
//!       --stub                 Use the in-memory stub deployment
//!       --log-format <FORMAT>  pretty, json or compact
//!   -v, --verbose              Enable debug logging
//! ```

pub mod app;
pub mod arming;
pub mod commands;
pub mod config;
pub mod dossier;
pub mod error;
pub mod handler;
pub mod reconciler;
pub mod runner;
pub mod subscriber;

pub use app::{IndexerApp, IndexerStatus};
pub use arming::{ArmRequest, CycleArming};
pub use commands::{Cli, Commands};
pub use config::{IndexerConfig, DEFAULT_CURSOR_NAME};
pub use dossier::{fetch_verification_dossier, VerificationDossier};
pub use error::{IndexerError, IndexerResult};
pub use reconciler::{derived_identity_key, CycleReconciler, ReconcileReport};
pub use runner::{BackgroundRunner, RunnerHandle};
pub use subscriber::{EventSubscriber, TickOutcome, TickSummary, DEFAULT_MAX_LOG_RANGE};
