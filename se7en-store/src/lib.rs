//! se7en indexer storage
//!
//! Durable home of the four record kinds the indexer writes:
//! decoded chain events, ingestion cursors, cycles and the audit trail.
//!
//! # Guarantees
//!
//! - Event inserts are idempotent on the identity key. A second insert of
//!   the same key reports [`InsertOutcome::Duplicate`] and changes nothing.
//! - A cursor only moves forward. Advancing to a lower block keeps the
//!   stored value.
//! - A cycle leaves ARMED at most once. The transition is a
//!   compare-and-set, so two reconcilers cannot both apply it.
//! - Completing a cycle writes the transition, its audit record and the
//!   derived event together. A failure leaves the cycle ARMED with none
//!   of the three written.
//!
//! Both backends give these guarantees without in-process locking on the
//! caller's side.

pub mod error;
pub mod memory;
pub mod sled;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use se7en_core::{
    AuditEntry, AuditLog, AuditLogRecord, ChainEvent, Cycle, CycleExecution, IngestionCursor,
    Module,
};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use self::sled::SledStore;

/// Result of an idempotent event insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row written
    Inserted,
    /// A row with the same identity key already existed
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Filter for [`IndexerStore::find_events`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub module: Option<Module>,
    /// Accepted event kinds
    pub kinds: Vec<String>,
    /// Correlation hash, compared case-insensitively
    pub correlation_hash: Option<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, module: Module) -> Self {
        self.module = Some(module);
        self
    }

    pub fn kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn correlation(mut self, hash: impl AsRef<str>) -> Self {
        self.correlation_hash = Some(hash.as_ref().to_lowercase());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event passes every set filter
    pub fn matches(&self, event: &ChainEvent) -> bool {
        if let Some(module) = self.module {
            if event.module != module {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == &event.event_kind) {
            return false;
        }
        if let Some(hash) = &self.correlation_hash {
            if !event.correlation_hash.eq_ignore_ascii_case(hash) {
                return false;
            }
        }
        true
    }

    /// Sort by chain position and apply the limit
    pub(crate) fn finish(&self, mut events: Vec<ChainEvent>) -> Vec<ChainEvent> {
        events.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });
        if let Some(limit) = self.limit {
            events.truncate(limit);
        }
        events
    }
}

/// A reconcilable cycle joined with its earliest confirming event
#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfirmation {
    pub cycle: Cycle,
    pub event: ChainEvent,
}

/// Everything written when a cycle is confirmed on-chain
#[derive(Debug, Clone)]
pub struct CycleCompletion {
    pub execution: CycleExecution,
    pub audit: AuditEntry,
    /// Stored unless its identity key already exists
    pub derived_event: ChainEvent,
}

/// Whether `a` sits before `b` in chain order
pub(crate) fn precedes(a: &ChainEvent, b: &ChainEvent) -> bool {
    (a.block_number, &a.identity_key) < (b.block_number, &b.identity_key)
}

/// Oldest `armed_at` first, ties broken by id
pub(crate) fn sort_oldest_first(cycles: &mut [Cycle]) {
    cycles.sort_by(|a, b| a.armed_at.cmp(&b.armed_at).then_with(|| a.id.cmp(&b.id)));
}

/// Row counts per record kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub events: u64,
    pub cursors: u64,
    pub cycles: u64,
    pub armed_cycles: u64,
    pub audit_records: u64,
}

/// Indexer storage interface
///
/// Implementations are also the audit sink, so a single store instance
/// backs every component.
#[async_trait]
pub trait IndexerStore: AuditLog {
    // ==================== Events ====================

    /// Insert unless a row with the same identity key exists
    async fn insert_event(&self, event: &ChainEvent) -> StoreResult<InsertOutcome>;

    async fn get_event(&self, identity_key: &str) -> StoreResult<Option<ChainEvent>>;

    /// Events matching a query, ordered by block then identity key
    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<ChainEvent>>;

    async fn count_events(&self) -> StoreResult<u64>;

    // ==================== Cursors ====================

    async fn get_cursor(&self, name: &str) -> StoreResult<Option<IngestionCursor>>;

    /// Upsert the cursor to `max(stored, block)` and return the stored value
    async fn advance_cursor(&self, name: &str, block: u64) -> StoreResult<IngestionCursor>;

    // ==================== Cycles ====================

    /// Insert a new cycle. An existing id is rejected.
    async fn insert_cycle(&self, cycle: &Cycle) -> StoreResult<()>;

    async fn get_cycle(&self, id: &str) -> StoreResult<Option<Cycle>>;

    /// Up to `limit` reconcilable cycles, oldest `armed_at` first
    async fn list_armed_cycles(&self, limit: usize) -> StoreResult<Vec<Cycle>>;

    /// Up to `limit` reconcilable cycles that have at least one event
    /// matching `confirmations` under their chain cycle id, oldest
    /// `armed_at` first. Cycles without one are passed over, so they never
    /// crowd confirmable cycles out of the batch.
    ///
    /// Any correlation set on `confirmations` is ignored.
    async fn confirmable_cycles(
        &self,
        confirmations: &EventQuery,
        limit: usize,
    ) -> StoreResult<Vec<CycleConfirmation>>;

    /// Move an ARMED cycle to EXECUTED, append its audit record and store
    /// the derived event, all or nothing.
    ///
    /// Returns the updated cycle, or `None` when the cycle is no longer
    /// ARMED, in which case nothing is written. An unknown id is
    /// [`StoreError::NotFound`].
    async fn complete_cycle(
        &self,
        id: &str,
        completion: &CycleCompletion,
    ) -> StoreResult<Option<Cycle>>;

    // ==================== Audit ====================

    /// Most recent audit records first
    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogRecord>>;

    // ==================== Maintenance ====================

    async fn stats(&self) -> StoreResult<StoreStats>;
}
