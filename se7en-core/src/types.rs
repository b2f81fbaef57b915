//! Persisted record types

use crate::module::Module;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication key for a chain log: `transactionHash:logIndex`.
///
/// Missing parts fall back to `0x0` and `0` so the key is always
/// computable and identical across restarts for the same log.
pub fn identity_key(transaction_hash: Option<&str>, log_index: Option<u64>) -> String {
    format!(
        "{}:{}",
        transaction_hash.unwrap_or("0x0").to_lowercase(),
        log_index.unwrap_or(0)
    )
}

/// One decoded chain log (or a derived record shaped like one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// Globally unique key, see [`identity_key`]
    pub identity_key: String,
    /// Module that emitted the log
    pub module: Module,
    /// Event name, e.g. `Attested`
    pub event_kind: String,
    /// Module-specific cross-reference hash
    pub correlation_hash: String,
    /// Transaction hash (lowercase 0x hex)
    pub transaction_hash: String,
    /// Block the log was included in
    pub block_number: u64,
    /// Normalized decoded arguments
    pub payload: serde_json::Value,
    /// When the row was created
    pub created_at: DateTime<Utc>,
}

/// Durable position of a named ingestion process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionCursor {
    pub name: String,
    pub last_processed_block: u64,
    pub updated_at: DateTime<Utc>,
}

impl IngestionCursor {
    pub fn new(name: impl Into<String>, last_processed_block: u64) -> Self {
        Self {
            name: name.into(),
            last_processed_block,
            updated_at: Utc::now(),
        }
    }
}

/// Cycle lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleStatus {
    /// Armed on-chain, awaiting confirmation of execution
    Armed,
    /// Execution confirmed on-chain
    Executed,
    /// The arming call itself failed
    Failed,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed => write!(f, "ARMED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A liquidity cycle applied to an issued note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub id: String,
    pub program: String,
    pub status: CycleStatus,
    /// Note id (decimal string, uint256 on-chain)
    pub note_id: String,
    /// Chain-assigned cycle id (lowercase 0x hex), unknown until confirmed
    pub cycle_id: Option<String>,
    pub tenor_days: u16,
    pub rate_bps: u16,
    pub operator: Option<String>,
    pub transaction_hash: Option<String>,
    pub armed_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Program name stamped on cycles and derived cycle events
pub const CYCLE_PROGRAM: &str = "cycle-engine";

impl Cycle {
    /// New armed cycle for a note
    pub fn armed(note_id: impl Into<String>, tenor_days: u16, rate_bps: u16) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            program: CYCLE_PROGRAM.to_string(),
            status: CycleStatus::Armed,
            note_id: note_id.into(),
            cycle_id: None,
            tenor_days,
            rate_bps,
            operator: None,
            transaction_hash: None,
            armed_at: Utc::now(),
            executed_at: None,
            failed_at: None,
            metadata: serde_json::json!({}),
        }
    }

    /// Set the chain-assigned cycle id (normalized to lowercase)
    pub fn with_cycle_id(mut self, cycle_id: impl AsRef<str>) -> Self {
        self.cycle_id = Some(cycle_id.as_ref().to_lowercase());
        self
    }

    pub fn with_transaction(mut self, tx_hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(tx_hash.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark as failed at creation time
    pub fn into_failed(mut self) -> Self {
        self.status = CycleStatus::Failed;
        self.failed_at = Some(Utc::now());
        self
    }

    /// Eligible for reconciliation: armed with a known chain cycle id
    pub fn is_reconcilable(&self) -> bool {
        self.status == CycleStatus::Armed && self.cycle_id.is_some()
    }

    /// Apply a confirmed execution. Metadata objects are merged key by key.
    pub fn apply_execution(&mut self, execution: &CycleExecution) {
        self.status = CycleStatus::Executed;
        self.executed_at = Some(execution.executed_at);
        self.failed_at = None;
        if let Some(tx) = &execution.transaction_hash {
            self.transaction_hash = Some(tx.clone());
        }
        merge_json(&mut self.metadata, &execution.metadata_patch);
    }
}

/// Confirmed on-chain execution of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleExecution {
    pub executed_at: DateTime<Utc>,
    pub transaction_hash: Option<String>,
    pub metadata_patch: serde_json::Value,
}

fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if patch.is_null() {
        return;
    }
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
        return;
    }
    *target = patch.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key(Some("0xABCD"), Some(3)), "0xabcd:3");
        assert_eq!(identity_key(None, None), "0x0:0");
    }

    #[test]
    fn test_cycle_execution_merges_metadata() {
        let mut cycle = Cycle::armed("1", 30, 250)
            .with_cycle_id("0xC")
            .with_metadata(json!({"source": "arm"}));
        assert!(cycle.is_reconcilable());
        assert_eq!(cycle.cycle_id.as_deref(), Some("0xc"));

        cycle.apply_execution(&CycleExecution {
            executed_at: Utc::now(),
            transaction_hash: Some("0xfeed".into()),
            metadata_patch: json!({"onChainUpdate": {"blockNumber": 12}}),
        });

        assert_eq!(cycle.status, CycleStatus::Executed);
        assert!(cycle.executed_at.is_some());
        assert!(!cycle.is_reconcilable());
        assert_eq!(cycle.metadata["source"], "arm");
        assert_eq!(cycle.metadata["onChainUpdate"]["blockNumber"], 12);
    }

    #[test]
    fn test_failed_cycle_not_reconcilable() {
        let cycle = Cycle::armed("2", 7, 100).with_cycle_id("0x01").into_failed();
        assert_eq!(cycle.status, CycleStatus::Failed);
        assert!(cycle.failed_at.is_some());
        assert!(!cycle.is_reconcilable());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&CycleStatus::Armed).unwrap(), "\"ARMED\"");
        assert_eq!(CycleStatus::Executed.to_string(), "EXECUTED");
    }
}
