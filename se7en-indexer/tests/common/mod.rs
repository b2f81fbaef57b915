//! Shared fixtures for the indexer integration tests

#![allow(dead_code)]

use alloy::primitives::Address;
use async_trait::async_trait;
use se7en_core::{
    AuditEntry, AuditLog, AuditLogRecord, ChainEvent, ContractAddressSet, CoreError, CoreResult,
    Cycle, IngestionCursor, Module,
};
use se7en_store::{
    CycleCompletion, CycleConfirmation, EventQuery, IndexerStore, InsertOutcome, MemoryStore,
    StoreError, StoreResult, StoreStats,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const CYCLE_ENGINE: Address = Address::repeat_byte(0xC1);
pub const ISSUANCE_ENGINE: Address = Address::repeat_byte(0xC2);
pub const ATTESTOR: Address = Address::repeat_byte(0xA1);
pub const CUSTODY_VAULT: Address = Address::repeat_byte(0xA3);

/// Every module configured with a distinct address
pub fn full_addresses() -> Arc<ContractAddressSet> {
    let set = Module::ALL
        .iter()
        .enumerate()
        .fold(ContractAddressSet::empty(), |set, (i, module)| {
            set.with(*module, Address::repeat_byte(0x10 + i as u8))
        })
        .with(Module::Attestor, ATTESTOR)
        .with(Module::CustodyVault, CUSTODY_VAULT)
        .with(Module::IssuanceEngine, ISSUANCE_ENGINE)
        .with(Module::CycleEngine, CYCLE_ENGINE);
    Arc::new(set)
}

/// Memory store with injectable failures
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_next_advance: AtomicBool,
    fail_next_audit: AtomicBool,
    fail_mark: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next cursor advance fail after events were written
    pub fn fail_next_advance(&self) {
        self.fail_next_advance.store(true, Ordering::SeqCst);
    }

    /// Make every execution transition of `id` fail
    pub fn fail_mark(&self, id: &str) {
        self.fail_mark.lock().unwrap().insert(id.to_string());
    }

    /// Make the next audit write fail, whether a plain append or the
    /// audit record of a cycle completion
    pub fn fail_next_audit(&self) {
        self.fail_next_audit.store(true, Ordering::SeqCst);
    }

    fn audit_fails(&self) -> bool {
        self.fail_next_audit.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditLog for FlakyStore {
    async fn append(&self, entry: AuditEntry) -> CoreResult<AuditLogRecord> {
        if self.audit_fails() {
            return Err(CoreError::Storage("audit volume read-only".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn find_by_attestation(&self, attestation_id: &str) -> CoreResult<Option<AuditLogRecord>> {
        self.inner.find_by_attestation(attestation_id).await
    }
}

#[async_trait]
impl IndexerStore for FlakyStore {
    async fn insert_event(&self, event: &ChainEvent) -> StoreResult<InsertOutcome> {
        self.inner.insert_event(event).await
    }

    async fn get_event(&self, identity_key: &str) -> StoreResult<Option<ChainEvent>> {
        self.inner.get_event(identity_key).await
    }

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<ChainEvent>> {
        self.inner.find_events(query).await
    }

    async fn count_events(&self) -> StoreResult<u64> {
        self.inner.count_events().await
    }

    async fn get_cursor(&self, name: &str) -> StoreResult<Option<IngestionCursor>> {
        self.inner.get_cursor(name).await
    }

    async fn advance_cursor(&self, name: &str, block: u64) -> StoreResult<IngestionCursor> {
        if self.fail_next_advance.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.advance_cursor(name, block).await
    }

    async fn insert_cycle(&self, cycle: &Cycle) -> StoreResult<()> {
        self.inner.insert_cycle(cycle).await
    }

    async fn get_cycle(&self, id: &str) -> StoreResult<Option<Cycle>> {
        self.inner.get_cycle(id).await
    }

    async fn list_armed_cycles(&self, limit: usize) -> StoreResult<Vec<Cycle>> {
        self.inner.list_armed_cycles(limit).await
    }

    async fn confirmable_cycles(
        &self,
        confirmations: &EventQuery,
        limit: usize,
    ) -> StoreResult<Vec<CycleConfirmation>> {
        self.inner.confirmable_cycles(confirmations, limit).await
    }

    async fn complete_cycle(
        &self,
        id: &str,
        completion: &CycleCompletion,
    ) -> StoreResult<Option<Cycle>> {
        if self.fail_mark.lock().unwrap().contains(id) {
            return Err(StoreError::Backend("write conflict".to_string()));
        }
        // All or nothing, like the real backends
        if self.audit_fails() {
            return Err(StoreError::Backend("audit volume read-only".to_string()));
        }
        self.inner.complete_cycle(id, completion).await
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogRecord>> {
        self.inner.list_audit(limit).await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.inner.stats().await
    }
}
