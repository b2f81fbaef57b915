//! Cycle reconciliation over ingested events

mod common;

use alloy::primitives::{Address, B256, U256};
use chrono::{Duration, Utc};
use common::{full_addresses, FlakyStore, CYCLE_ENGINE};
use se7en_chain::abi::ICycleEngine;
use se7en_chain::StubChain;
use se7en_core::{actions, Cycle, CycleStatus};
use se7en_indexer::{derived_identity_key, CycleReconciler, EventSubscriber};
use se7en_store::{IndexerStore, MemoryStore};
use std::sync::Arc;

fn cycle_word(byte: u8) -> B256 {
    B256::with_last_byte(byte)
}

fn executed(cycle: u8, note: u64) -> ICycleEngine::CycleExecuted {
    ICycleEngine::CycleExecuted {
        cycleId: cycle_word(cycle),
        noteId: U256::from(note),
        tenorDays: 30,
        rateBps: 250,
        operator: Address::repeat_byte(0x0F),
        timestamp: U256::from(1_700_000_000u64),
    }
}

async fn push_executed(chain: &StubChain, cycle: u8, note: u64, block: u64) {
    chain
        .push_log(StubChain::event_log(
            CYCLE_ENGINE,
            &executed(cycle, note),
            block,
            B256::repeat_byte(cycle),
            0,
        ))
        .await;
    if chain.head().await < block {
        chain.set_head(block).await;
    }
}

async fn ingest<S: IndexerStore + 'static>(chain: &Arc<StubChain>, store: &Arc<S>) {
    EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events")
        .tick()
        .await
        .unwrap();
}

async fn armed_cycle<S: IndexerStore>(store: &S, cycle: u8, note: u64) -> Cycle {
    let cycle = Cycle::armed(note.to_string(), 30, 250)
        .with_cycle_id(format!("{:#x}", cycle_word(cycle)))
        .with_operator("0xoperator");
    store.insert_cycle(&cycle).await.unwrap();
    cycle
}

async fn count_action<S: IndexerStore>(store: &S, action: &str) -> usize {
    store
        .list_audit(1_000)
        .await
        .unwrap()
        .iter()
        .filter(|r| r.action == action)
        .count()
}

#[tokio::test]
async fn test_confirmed_cycle_transitions_once() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    let cycle = armed_cycle(store.as_ref(), 0x0C, 1).await;
    push_executed(&chain, 0x0C, 1, 3).await;
    ingest(&chain, &store).await;

    let reconciler = CycleReconciler::new(store.clone(), 10);
    assert_eq!(reconciler.reconcile().await.unwrap(), 1);

    let updated = store.get_cycle(&cycle.id).await.unwrap().unwrap();
    assert_eq!(updated.status, CycleStatus::Executed);
    assert_eq!(updated.executed_at.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(
        updated.transaction_hash.as_deref(),
        Some(format!("{:#x}", B256::repeat_byte(0x0C)).as_str())
    );
    assert_eq!(updated.metadata["onChainUpdate"]["blockNumber"], 3);

    let audit = store.list_audit(1).await.unwrap();
    assert_eq!(audit[0].action, actions::CYCLE_EXECUTE_AUTO);
    assert_eq!(audit[0].payload["route"], "cycle_watcher");
    assert_eq!(audit[0].payload["cycleId"], cycle.id.as_str());

    let cycle_id = cycle.cycle_id.clone().unwrap();
    let derived = store
        .get_event(&derived_identity_key(&cycle_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(derived.event_kind, "CycleExecutedAuto");
    assert_eq!(derived.correlation_hash, cycle_id);
    assert_eq!(derived.payload["noteId"], "1");
    assert!(derived.payload["note"].is_null());

    // Second pass finds nothing to do
    let report = reconciler.run_pass().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(count_action(store.as_ref(), actions::CYCLE_EXECUTE_AUTO).await, 1);
}

#[tokio::test]
async fn test_unconfirmed_cycle_stays_armed() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    let waiting = armed_cycle(store.as_ref(), 0x0D, 2).await;
    // Confirms a different cycle
    push_executed(&chain, 0x0E, 2, 4).await;
    ingest(&chain, &store).await;

    let report = CycleReconciler::new(store.clone(), 10).run_pass().await.unwrap();

    assert_eq!(report.examined, 0);
    assert_eq!(report.transitioned, 0);
    let still = store.get_cycle(&waiting.id).await.unwrap().unwrap();
    assert_eq!(still.status, CycleStatus::Armed);
    assert_eq!(count_action(store.as_ref(), actions::CYCLE_EXECUTE_AUTO).await, 0);
}

#[tokio::test]
async fn test_cycle_run_event_confirms() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    let cycle = armed_cycle(store.as_ref(), 0x21, 5).await;
    let run = ICycleEngine::CycleRun {
        cycleId: cycle_word(0x21),
        noteId: U256::from(5u64),
    };
    chain
        .push_log(StubChain::event_log(CYCLE_ENGINE, &run, 2, B256::repeat_byte(0x21), 0))
        .await;
    chain.set_head(2).await;
    ingest(&chain, &store).await;

    assert_eq!(CycleReconciler::new(store.clone(), 10).reconcile().await.unwrap(), 1);

    let updated = store.get_cycle(&cycle.id).await.unwrap().unwrap();
    assert_eq!(updated.status, CycleStatus::Executed);
    // No timestamp on the bare event: stamped at reconciliation time
    assert!(updated.executed_at.unwrap() >= cycle.armed_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconcilers_transition_once() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    armed_cycle(store.as_ref(), 0x0C, 1).await;
    push_executed(&chain, 0x0C, 1, 3).await;
    ingest(&chain, &store).await;

    let first = CycleReconciler::new(store.clone(), 10);
    let second = CycleReconciler::new(store.clone(), 10);
    let (a, b) = tokio::join!(first.reconcile(), second.reconcile());

    assert_eq!(a.unwrap() + b.unwrap(), 1);
    assert_eq!(count_action(store.as_ref(), actions::CYCLE_EXECUTE_AUTO).await, 1);
}

#[tokio::test]
async fn test_failing_cycle_does_not_stop_batch() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(FlakyStore::new());
    let broken = armed_cycle(store.as_ref(), 0x31, 7).await;
    let healthy = armed_cycle(store.as_ref(), 0x32, 8).await;
    push_executed(&chain, 0x31, 7, 5).await;
    push_executed(&chain, 0x32, 8, 6).await;
    ingest(&chain, &store).await;
    store.fail_mark(&broken.id);

    let report = CycleReconciler::new(store.clone(), 10).run_pass().await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.transitioned, 1);
    assert_eq!(report.failed, 1);
    let broken = store.get_cycle(&broken.id).await.unwrap().unwrap();
    assert_eq!(broken.status, CycleStatus::Armed);
    let healthy = store.get_cycle(&healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.status, CycleStatus::Executed);
}

#[tokio::test]
async fn test_pass_is_bounded_by_batch_size() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    for (i, byte) in [0x41u8, 0x42, 0x43].into_iter().enumerate() {
        armed_cycle(store.as_ref(), byte, i as u64 + 1).await;
        push_executed(&chain, byte, i as u64 + 1, i as u64 + 1).await;
    }
    ingest(&chain, &store).await;

    let reconciler = CycleReconciler::new(store.clone(), 2);
    assert_eq!(reconciler.reconcile().await.unwrap(), 2);
    assert_eq!(reconciler.reconcile().await.unwrap(), 1);
    assert_eq!(reconciler.reconcile().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unconfirmed_backlog_does_not_starve_newer_cycle() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    for i in 0..25u8 {
        let mut stale = Cycle::armed(i.to_string(), 30, 250)
            .with_cycle_id(format!("{:#x}", cycle_word(0x80 + i)));
        stale.armed_at = now - Duration::hours(2) + Duration::minutes(i as i64);
        store.insert_cycle(&stale).await.unwrap();
    }
    let fresh = armed_cycle(store.as_ref(), 0x51, 9).await;
    push_executed(&chain, 0x51, 9, 8).await;
    ingest(&chain, &store).await;

    let report = CycleReconciler::new(store.clone(), 25).run_pass().await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.transitioned, 1);
    let fresh = store.get_cycle(&fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, CycleStatus::Executed);
    assert_eq!(store.stats().await.unwrap().armed_cycles, 25);
}

#[tokio::test]
async fn test_failed_audit_write_leaves_cycle_armed_for_retry() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(FlakyStore::new());
    let cycle = armed_cycle(store.as_ref(), 0x61, 4).await;
    push_executed(&chain, 0x61, 4, 6).await;
    ingest(&chain, &store).await;
    store.fail_next_audit();

    let reconciler = CycleReconciler::new(store.clone(), 10);
    let first = reconciler.run_pass().await.unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!(first.transitioned, 0);
    let still = store.get_cycle(&cycle.id).await.unwrap().unwrap();
    assert_eq!(still.status, CycleStatus::Armed);
    assert_eq!(count_action(store.as_ref(), actions::CYCLE_EXECUTE_AUTO).await, 0);
    let cycle_id = cycle.cycle_id.clone().unwrap();
    assert!(store
        .get_event(&derived_identity_key(&cycle_id))
        .await
        .unwrap()
        .is_none());

    let second = reconciler.run_pass().await.unwrap();

    assert_eq!(second.transitioned, 1);
    let done = store.get_cycle(&cycle.id).await.unwrap().unwrap();
    assert_eq!(done.status, CycleStatus::Executed);
    assert_eq!(count_action(store.as_ref(), actions::CYCLE_EXECUTE_AUTO).await, 1);
    assert!(store
        .get_event(&derived_identity_key(&cycle_id))
        .await
        .unwrap()
        .is_some());
}
