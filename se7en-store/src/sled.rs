//! Sled persistent store
//!
//! Embedded, crash-safe storage for a single indexer process.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
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

const EVENTS_TREE: &str = "events";
const EVENTS_BY_CORRELATION_TREE: &str = "events_by_correlation";
const CURSORS_TREE: &str = "cursors";
const CYCLES_TREE: &str = "cycles";
const AUDIT_TREE: &str = "audit";
const AUDIT_BY_ATTESTATION_TREE: &str = "audit_by_attestation";

/// Sled-backed store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    events: sled::Tree,
    events_by_correlation: sled::Tree,
    cursors: sled::Tree,
    cycles: sled::Tree,
    audit: sled::Tree,
    audit_by_attestation: sled::Tree,
}

fn backend(context: &'static str) -> impl Fn(sled::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{}: {}", context, e))
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path).map_err(backend("Failed to open sled db"))?;

        let events = db
            .open_tree(EVENTS_TREE)
            .map_err(backend("Failed to open events tree"))?;
        let events_by_correlation = db
            .open_tree(EVENTS_BY_CORRELATION_TREE)
            .map_err(backend("Failed to open events_by_correlation tree"))?;
        let cursors = db
            .open_tree(CURSORS_TREE)
            .map_err(backend("Failed to open cursors tree"))?;
        let cycles = db
            .open_tree(CYCLES_TREE)
            .map_err(backend("Failed to open cycles tree"))?;
        let audit = db
            .open_tree(AUDIT_TREE)
            .map_err(backend("Failed to open audit tree"))?;
        let audit_by_attestation = db
            .open_tree(AUDIT_BY_ATTESTATION_TREE)
            .map_err(backend("Failed to open audit_by_attestation tree"))?;

        Ok(Self {
            db,
            events,
            events_by_correlation,
            cursors,
            cycles,
            audit,
            audit_by_attestation,
        })
    }

    /// Drop all data
    pub fn clear(&self) -> StoreResult<()> {
        for tree in [
            &self.events,
            &self.events_by_correlation,
            &self.cursors,
            &self.cycles,
            &self.audit,
            &self.audit_by_attestation,
        ] {
            tree.clear().map_err(backend("Failed to clear tree"))?;
        }
        Ok(())
    }

    /// Flush to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(backend("Failed to flush db"))?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn serialize<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// `<lowercase correlation hash> NUL <identity key>`
    fn correlation_key(correlation_hash: &str, identity_key: &str) -> Vec<u8> {
        let mut key = Self::correlation_prefix(correlation_hash);
        key.extend_from_slice(identity_key.as_bytes());
        key
    }

    fn correlation_prefix(correlation_hash: &str) -> Vec<u8> {
        let mut key = correlation_hash.to_lowercase().into_bytes();
        key.push(0);
        key
    }

    /// Audit ids start at 1 and only grow
    fn next_audit_id(&self) -> StoreResult<u64> {
        Ok(self
            .db
            .generate_id()
            .map_err(backend("Failed to allocate audit id"))?
            + 1)
    }

    fn reconcilable_cycles(&self) -> StoreResult<Vec<Cycle>> {
        let mut armed = Vec::new();
        for item in self.cycles.iter() {
            let (_, value) = item.map_err(backend("Failed to iterate cycles"))?;
            let cycle: Cycle = Self::deserialize(&value)?;
            if cycle.is_reconcilable() {
                armed.push(cycle);
            }
        }
        sort_oldest_first(&mut armed);
        Ok(armed)
    }

    /// Earliest event under `correlation_hash` that passes `query`
    fn first_correlated(
        &self,
        correlation_hash: &str,
        query: &EventQuery,
    ) -> StoreResult<Option<ChainEvent>> {
        let mut first: Option<ChainEvent> = None;
        for item in self.events_by_correlation.scan_prefix(Self::correlation_prefix(correlation_hash)) {
            let (_, key) = item.map_err(backend("Failed to scan event index"))?;
            let Some(bytes) = self.events.get(&key).map_err(backend("Failed to get event"))? else {
                continue;
            };
            let event: ChainEvent = Self::deserialize(&bytes)?;
            if query.matches(&event) && first.as_ref().map_or(true, |f| precedes(&event, f)) {
                first = Some(event);
            }
        }
        Ok(first)
    }
}

/// Cursor value layout: block (u64 BE) followed by update time (i64 BE millis)
fn encode_cursor(block: u64, updated_at: DateTime<Utc>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&block.to_be_bytes());
    bytes.extend_from_slice(&updated_at.timestamp_millis().to_be_bytes());
    bytes
}

fn decode_cursor(name: &str, bytes: &[u8]) -> StoreResult<IngestionCursor> {
    if bytes.len() != 16 {
        return Err(StoreError::Backend(format!(
            "corrupt cursor {}: {} bytes",
            name,
            bytes.len()
        )));
    }
    let mut block = [0u8; 8];
    let mut millis = [0u8; 8];
    block.copy_from_slice(&bytes[..8]);
    millis.copy_from_slice(&bytes[8..]);
    let updated_at = Utc
        .timestamp_millis_opt(i64::from_be_bytes(millis))
        .single()
        .unwrap_or_else(Utc::now);
    Ok(IngestionCursor {
        name: name.to_string(),
        last_processed_block: u64::from_be_bytes(block),
        updated_at,
    })
}

#[async_trait]
impl AuditLog for SledStore {
    async fn append(&self, entry: AuditEntry) -> CoreResult<AuditLogRecord> {
        let id = self.next_audit_id()?;
        let record = AuditLogRecord::from_entry(id, entry);
        let value = Self::serialize(&record)?;

        self.audit
            .insert(id.to_be_bytes(), value)
            .map_err(backend("Failed to append audit record"))?;
        if let Some(attestation_id) = &record.attestation_id {
            self.audit_by_attestation
                .insert(attestation_id.as_bytes(), id.to_be_bytes().to_vec())
                .map_err(backend("Failed to index audit record"))?;
        }
        Ok(record)
    }

    async fn find_by_attestation(&self, attestation_id: &str) -> CoreResult<Option<AuditLogRecord>> {
        let Some(id) = self
            .audit_by_attestation
            .get(attestation_id.as_bytes())
            .map_err(backend("Failed to read audit index"))?
        else {
            return Ok(None);
        };
        match self
            .audit
            .get(&id)
            .map_err(backend("Failed to read audit record"))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IndexerStore for SledStore {
    // ==================== Events ====================

    async fn insert_event(&self, event: &ChainEvent) -> StoreResult<InsertOutcome> {
        let key = event.identity_key.as_bytes();
        let value = Self::serialize(event)?;
        let index_key = Self::correlation_key(&event.correlation_hash, &event.identity_key);

        // Row and index land together or not at all
        let inserted = (&self.events, &self.events_by_correlation)
            .transaction(|(events, index)| {
                if events.get(key)?.is_some() {
                    return Ok(false);
                }
                events.insert(key, value.as_slice())?;
                index.insert(index_key.as_slice(), key)?;
                Ok(true)
            })
            .map_err(|e: TransactionError<()>| {
                StoreError::Backend(format!("Failed to insert event: {:?}", e))
            })?;

        if inserted {
            Ok(InsertOutcome::Inserted)
        } else {
            debug!(identity_key = %event.identity_key, "Event already stored");
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn get_event(&self, identity_key: &str) -> StoreResult<Option<ChainEvent>> {
        match self
            .events
            .get(identity_key.as_bytes())
            .map_err(backend("Failed to get event"))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<ChainEvent>> {
        let mut events = Vec::new();

        match &query.correlation_hash {
            Some(hash) => {
                for item in self.events_by_correlation.scan_prefix(Self::correlation_prefix(hash)) {
                    let (_, key) = item.map_err(backend("Failed to scan event index"))?;
                    if let Some(bytes) = self.events.get(&key).map_err(backend("Failed to get event"))? {
                        let event: ChainEvent = Self::deserialize(&bytes)?;
                        if query.matches(&event) {
                            events.push(event);
                        }
                    }
                }
            }
            None => {
                for item in self.events.iter() {
                    let (_, value) = item.map_err(backend("Failed to iterate events"))?;
                    let event: ChainEvent = Self::deserialize(&value)?;
                    if query.matches(&event) {
                        events.push(event);
                    }
                }
            }
        }

        Ok(query.finish(events))
    }

    async fn count_events(&self) -> StoreResult<u64> {
        Ok(self.events.len() as u64)
    }

    // ==================== Cursors ====================

    async fn get_cursor(&self, name: &str) -> StoreResult<Option<IngestionCursor>> {
        match self
            .cursors
            .get(name.as_bytes())
            .map_err(backend("Failed to get cursor"))?
        {
            Some(bytes) => Ok(Some(decode_cursor(name, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn advance_cursor(&self, name: &str, block: u64) -> StoreResult<IngestionCursor> {
        let stored = self
            .cursors
            .update_and_fetch(name.as_bytes(), |old| {
                let current = old
                    .and_then(|bytes| decode_cursor(name, bytes).ok())
                    .map(|c| c.last_processed_block)
                    .unwrap_or(0);
                match old {
                    Some(bytes) if current > block => Some(bytes.to_vec()),
                    _ => Some(encode_cursor(block, Utc::now())),
                }
            })
            .map_err(backend("Failed to advance cursor"))?
            .ok_or_else(|| StoreError::Backend(format!("cursor {} vanished", name)))?;
        decode_cursor(name, &stored)
    }

    // ==================== Cycles ====================

    async fn insert_cycle(&self, cycle: &Cycle) -> StoreResult<()> {
        let value = Self::serialize(cycle)?;
        self.cycles
            .compare_and_swap(cycle.id.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(backend("Failed to insert cycle"))?
            .map_err(|_| StoreError::InvalidInput(format!("cycle {} already exists", cycle.id)))
    }

    async fn get_cycle(&self, id: &str) -> StoreResult<Option<Cycle>> {
        match self
            .cycles
            .get(id.as_bytes())
            .map_err(backend("Failed to get cycle"))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_armed_cycles(&self, limit: usize) -> StoreResult<Vec<Cycle>> {
        let mut armed = self.reconcilable_cycles()?;
        armed.truncate(limit);
        Ok(armed)
    }

    async fn confirmable_cycles(
        &self,
        confirmations: &EventQuery,
        limit: usize,
    ) -> StoreResult<Vec<CycleConfirmation>> {
        let query = EventQuery {
            correlation_hash: None,
            ..confirmations.clone()
        };

        let mut found = Vec::new();
        for cycle in self.reconcilable_cycles()? {
            if found.len() >= limit {
                break;
            }
            let Some(cycle_id) = cycle.cycle_id.as_deref() else {
                continue;
            };
            if let Some(event) = self.first_correlated(cycle_id, &query)? {
                found.push(CycleConfirmation { cycle, event });
            }
        }
        Ok(found)
    }

    async fn complete_cycle(
        &self,
        id: &str,
        completion: &CycleCompletion,
    ) -> StoreResult<Option<Cycle>> {
        let audit_id = self.next_audit_id()?;
        let audit_key = audit_id.to_be_bytes().to_vec();
        let record = AuditLogRecord::from_entry(audit_id, completion.audit.clone());
        let record_value = Self::serialize(&record)?;

        let derived = &completion.derived_event;
        let derived_key = derived.identity_key.as_bytes();
        let derived_value = Self::serialize(derived)?;
        let derived_index = Self::correlation_key(&derived.correlation_hash, &derived.identity_key);

        // Cycle row, audit record and derived event land together or not at all
        let outcome = (
            &self.cycles,
            &self.events,
            &self.events_by_correlation,
            &self.audit,
            &self.audit_by_attestation,
        )
            .transaction(|(cycles, events, index, audit, audit_index)| {
                let Some(current) = cycles.get(id.as_bytes())? else {
                    return Err(ConflictableTransactionError::Abort(StoreError::NotFound(
                        format!("cycle {}", id),
                    )));
                };
                let mut cycle: Cycle =
                    Self::deserialize(&current).map_err(ConflictableTransactionError::Abort)?;
                if cycle.status != CycleStatus::Armed {
                    return Ok(None);
                }
                cycle.apply_execution(&completion.execution);
                let value = Self::serialize(&cycle).map_err(ConflictableTransactionError::Abort)?;
                cycles.insert(id.as_bytes(), value)?;

                audit.insert(audit_key.as_slice(), record_value.as_slice())?;
                if let Some(attestation_id) = &record.attestation_id {
                    audit_index.insert(attestation_id.as_bytes(), audit_key.as_slice())?;
                }

                if events.get(derived_key)?.is_none() {
                    events.insert(derived_key, derived_value.as_slice())?;
                    index.insert(derived_index.as_slice(), derived_key)?;
                }
                Ok(Some(cycle))
            });

        match outcome {
            Ok(updated) => Ok(updated),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => {
                Err(StoreError::Backend(format!("Failed to complete cycle: {}", e)))
            }
        }
    }

    // ==================== Audit ====================

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogRecord>> {
        let mut records = Vec::new();
        for item in self.audit.iter().rev().take(limit) {
            let (_, value) = item.map_err(backend("Failed to iterate audit"))?;
            records.push(Self::deserialize(&value)?);
        }
        Ok(records)
    }

    // ==================== Maintenance ====================

    async fn stats(&self) -> StoreResult<StoreStats> {
        let mut armed_cycles = 0;
        for item in self.cycles.iter() {
            let (_, value) = item.map_err(backend("Failed to iterate cycles"))?;
            let cycle: Cycle = Self::deserialize(&value)?;
            if cycle.status == CycleStatus::Armed {
                armed_cycles += 1;
            }
        }

        Ok(StoreStats {
            events: self.events.len() as u64,
            cursors: self.cursors.len() as u64,
            cycles: self.cycles.len() as u64,
            armed_cycles,
            audit_records: self.audit.len() as u64,
        })
    }
}
