//! In-memory store
//!
//! Used by tests, the stub deployment and any run without a data dir.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    precedes, sort_oldest_first, CycleCompletion, CycleConfirmation, EventQuery, IndexerStore,
    InsertOutcome, StoreStats,
};
use crate::error::{StoreError, StoreResult};
use se7en_core::{
    AuditEntry, AuditLog, AuditLogRecord, ChainEvent, CoreResult, Cycle, CycleExecution,
    CycleStatus, IngestionCursor,
};

/// Thread-safe in-memory store; each collection sits behind its own lock.
/// Operations spanning several collections lock them in field order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Arc<RwLock<HashMap<String, ChainEvent>>>,
    cursors: Arc<RwLock<HashMap<String, IngestionCursor>>>,
    cycles: Arc<RwLock<HashMap<String, Cycle>>>,
    audit: Arc<RwLock<Vec<AuditLogRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all data
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.cursors.write().await.clear();
        self.cycles.write().await.clear();
        self.audit.write().await.clear();
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> CoreResult<AuditLogRecord> {
        let mut audit = self.audit.write().await;
        let record = AuditLogRecord::from_entry(audit.len() as u64 + 1, entry);
        audit.push(record.clone());
        Ok(record)
    }

    async fn find_by_attestation(&self, attestation_id: &str) -> CoreResult<Option<AuditLogRecord>> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .rev()
            .find(|r| r.attestation_id.as_deref() == Some(attestation_id))
            .cloned())
    }
}

#[async_trait]
impl IndexerStore for MemoryStore {
    // ==================== Events ====================

    async fn insert_event(&self, event: &ChainEvent) -> StoreResult<InsertOutcome> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.identity_key) {
            debug!(identity_key = %event.identity_key, "Event already stored");
            return Ok(InsertOutcome::Duplicate);
        }
        events.insert(event.identity_key.clone(), event.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_event(&self, identity_key: &str) -> StoreResult<Option<ChainEvent>> {
        Ok(self.events.read().await.get(identity_key).cloned())
    }

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<ChainEvent>> {
        let events = self.events.read().await;
        let matched = events.values().filter(|e| query.matches(e)).cloned().collect();
        Ok(query.finish(matched))
    }

    async fn count_events(&self) -> StoreResult<u64> {
        Ok(self.events.read().await.len() as u64)
    }

    // ==================== Cursors ====================

    async fn get_cursor(&self, name: &str) -> StoreResult<Option<IngestionCursor>> {
        Ok(self.cursors.read().await.get(name).cloned())
    }

    async fn advance_cursor(&self, name: &str, block: u64) -> StoreResult<IngestionCursor> {
        let mut cursors = self.cursors.write().await;
        let cursor = cursors
            .entry(name.to_string())
            .or_insert_with(|| IngestionCursor::new(name, 0));
        if block >= cursor.last_processed_block {
            cursor.last_processed_block = block;
            cursor.updated_at = Utc::now();
        }
        Ok(cursor.clone())
    }

    // ==================== Cycles ====================

    async fn insert_cycle(&self, cycle: &Cycle) -> StoreResult<()> {
        let mut cycles = self.cycles.write().await;
        if cycles.contains_key(&cycle.id) {
            return Err(StoreError::InvalidInput(format!(
                "cycle {} already exists",
                cycle.id
            )));
        }
        cycles.insert(cycle.id.clone(), cycle.clone());
        Ok(())
    }

    async fn get_cycle(&self, id: &str) -> StoreResult<Option<Cycle>> {
        Ok(self.cycles.read().await.get(id).cloned())
    }

    async fn list_armed_cycles(&self, limit: usize) -> StoreResult<Vec<Cycle>> {
        let cycles = self.cycles.read().await;
        let mut armed: Vec<Cycle> = cycles
            .values()
            .filter(|c| c.is_reconcilable())
            .cloned()
            .collect();
        sort_oldest_first(&mut armed);
        armed.truncate(limit);
        Ok(armed)
    }

    async fn confirmable_cycles(
        &self,
        confirmations: &EventQuery,
        limit: usize,
    ) -> StoreResult<Vec<CycleConfirmation>> {
        let events = self.events.read().await;
        let cycles = self.cycles.read().await;

        let query = EventQuery {
            correlation_hash: None,
            ..confirmations.clone()
        };
        let mut first_by_cycle: HashMap<String, &ChainEvent> = HashMap::new();
        for event in events.values().filter(|e| query.matches(e)) {
            let key = event.correlation_hash.to_lowercase();
            if first_by_cycle.get(&key).map_or(true, |first| precedes(event, first)) {
                first_by_cycle.insert(key, event);
            }
        }

        let mut armed: Vec<Cycle> = cycles
            .values()
            .filter(|c| {
                c.is_reconcilable()
                    && c.cycle_id
                        .as_ref()
                        .is_some_and(|id| first_by_cycle.contains_key(id.as_str()))
            })
            .cloned()
            .collect();
        sort_oldest_first(&mut armed);
        armed.truncate(limit);

        Ok(armed
            .into_iter()
            .filter_map(|cycle| {
                let event = (*first_by_cycle.get(cycle.cycle_id.as_deref()?)?).clone();
                Some(CycleConfirmation { cycle, event })
            })
            .collect())
    }

    async fn complete_cycle(
        &self,
        id: &str,
        completion: &CycleCompletion,
    ) -> StoreResult<Option<Cycle>> {
        let mut events = self.events.write().await;
        let mut cycles = self.cycles.write().await;
        let mut audit = self.audit.write().await;

        let cycle = cycles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("cycle {}", id)))?;
        if cycle.status != CycleStatus::Armed {
            return Ok(None);
        }
        cycle.apply_execution(&completion.execution);

        let record = AuditLogRecord::from_entry(audit.len() as u64 + 1, completion.audit.clone());
        audit.push(record);
        let derived = &completion.derived_event;
        if events.contains_key(&derived.identity_key) {
            debug!(identity_key = %derived.identity_key, "Derived event already stored");
        } else {
            events.insert(derived.identity_key.clone(), derived.clone());
        }
        Ok(Some(cycle.clone()))
    }

    // ==================== Audit ====================

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogRecord>> {
        let audit = self.audit.read().await;
        Ok(audit.iter().rev().take(limit).cloned().collect())
    }

    // ==================== Maintenance ====================

    async fn stats(&self) -> StoreResult<StoreStats> {
        let events = self.events.read().await.len() as u64;
        let cursors = self.cursors.read().await.len() as u64;
        let (cycles, armed_cycles) = {
            let cycles = self.cycles.read().await;
            let armed = cycles
                .values()
                .filter(|c| c.status == CycleStatus::Armed)
                .count();
            (cycles.len() as u64, armed as u64)
        };
        Ok(StoreStats {
            events,
            cursors,
            cycles,
            armed_cycles,
            audit_records: self.audit.read().await.len() as u64,
        })
    }
}
