//! se7en Core
//!
//! Shared vocabulary for the se7en chain indexer: the eight contract
//! modules and their validated address set, the persisted records
//! (chain events, ingestion cursors, cycles, audit records), the audit
//! trail contract every state-changing component writes through, and
//! the logging setup used by the binaries.
//!
//! # Records
//!
//! | Record            | Mutability      | Key                     |
//! |-------------------|-----------------|-------------------------|
//! | `ChainEvent`      | append-only     | `txHash:logIndex`       |
//! | `IngestionCursor` | monotonic       | subscriber name         |
//! | `Cycle`           | status machine  | uuid                    |
//! | `AuditLogRecord`  | append-only     | sequence id             |

pub mod audit;
pub mod error;
pub mod logging;
pub mod module;
pub mod types;

pub use audit::{actions, AuditEntry, AuditLog, AuditLogRecord, AuditOutcome};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use module::{parse_address, ContractAddressSet, Module};
pub use types::{
    identity_key, ChainEvent, Cycle, CycleExecution, CycleStatus, IngestionCursor, CYCLE_PROGRAM,
};
