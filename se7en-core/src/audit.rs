//! Audit trail
//!
//! Every operation that changes on-chain state, a cursor, or a cycle
//! writes exactly one [`AuditEntry`] through an [`AuditLog`]. Records are
//! append-only.

use crate::error::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action tags
pub mod actions {
    /// A mutating gateway call was refused because addresses are missing
    pub const ADDR_MISSING: &str = "ADDR_MISSING";
    /// An ingestion tick advanced the cursor (or failed trying)
    pub const CHAIN_INGEST: &str = "CHAIN_INGEST";
    /// A cycle was armed on-chain
    pub const CYCLE_ARM: &str = "CYCLE_ARM";
    /// The reconciler confirmed a cycle's execution
    pub const CYCLE_EXECUTE_AUTO: &str = "CYCLE_EXECUTE_AUTO";
    /// Suffix marking a recoverable warning outcome
    pub const WARNING_SUFFIX: &str = "_WITH_WARNING";
}

/// Outcome recorded in the payload `result` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Ok,
    Warning,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Audit record about to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub asset_id: String,
    pub attestation_id: Option<String>,
    pub transaction_hash: Option<String>,
    pub payload: serde_json::Value,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            asset_id: asset_id.into(),
            attestation_id: None,
            transaction_hash: None,
            payload: serde_json::json!({}),
        }
    }

    pub fn with_attestation(mut self, attestation_id: impl Into<String>) -> Self {
        self.attestation_id = Some(attestation_id.into());
        self
    }

    pub fn with_transaction(mut self, tx_hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(tx_hash.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Stamp the outcome into `payload.result`. A warning also gets the
    /// `_WITH_WARNING` action suffix.
    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        if outcome == AuditOutcome::Warning && !self.action.ends_with(actions::WARNING_SUFFIX) {
            self.action.push_str(actions::WARNING_SUFFIX);
        }
        if !self.payload.is_object() {
            self.payload = serde_json::json!({ "value": self.payload });
        }
        if let Some(map) = self.payload.as_object_mut() {
            map.insert("result".to_string(), outcome.as_str().into());
        }
        self
    }
}

/// Stored audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    pub id: u64,
    pub action: String,
    pub asset_id: String,
    pub attestation_id: Option<String>,
    pub transaction_hash: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogRecord {
    pub fn from_entry(id: u64, entry: AuditEntry) -> Self {
        Self {
            id,
            action: entry.action,
            asset_id: entry.asset_id,
            attestation_id: entry.attestation_id,
            transaction_hash: entry.transaction_hash,
            payload: entry.payload,
            created_at: Utc::now(),
        }
    }

    /// Whether the action carries the warning marker
    pub fn is_warning(&self) -> bool {
        self.action.ends_with(actions::WARNING_SUFFIX)
    }
}

/// Append-only audit sink
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record
    async fn append(&self, entry: AuditEntry) -> CoreResult<AuditLogRecord>;

    /// Most recent record referencing an attestation
    async fn find_by_attestation(&self, attestation_id: &str) -> CoreResult<Option<AuditLogRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_warning_outcome_tags_action() {
        let entry = AuditEntry::new(actions::CYCLE_ARM, "asset-1")
            .with_payload(json!({"noteId": "1"}))
            .with_outcome(AuditOutcome::Warning);

        assert_eq!(entry.action, "CYCLE_ARM_WITH_WARNING");
        assert_eq!(entry.payload["result"], "warning");
        assert_eq!(entry.payload["noteId"], "1");

        let record = AuditLogRecord::from_entry(1, entry);
        assert!(record.is_warning());
    }

    #[test]
    fn test_outcome_wraps_scalar_payload() {
        let entry = AuditEntry::new(actions::CHAIN_INGEST, "system")
            .with_payload(json!(12))
            .with_outcome(AuditOutcome::Ok);
        assert_eq!(entry.payload, json!({"value": 12, "result": "ok"}));
        assert_eq!(entry.action, actions::CHAIN_INGEST);
    }
}
