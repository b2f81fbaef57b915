//! Event subscriber against a scripted chain

mod common;

use alloy::primitives::{Address, Bytes, B256, U256};
use common::{full_addresses, FlakyStore, ATTESTOR, CUSTODY_VAULT};
use se7en_chain::abi::{IAttestor, ICustodyVault};
use se7en_chain::{RawLog, StubChain};
use se7en_core::{actions, ContractAddressSet, Module};
use se7en_indexer::{EventSubscriber, TickOutcome};
use se7en_store::{EventQuery, IndexerStore, MemoryStore, SledStore};
use std::sync::Arc;
use tempfile::tempdir;

fn attested(id: u8) -> IAttestor::Attested {
    IAttestor::Attested {
        attestationId: B256::repeat_byte(id),
        subjectId: B256::repeat_byte(0x51),
        payloadHash: B256::repeat_byte(0x52),
        jurisdiction: "US-DE".to_string(),
        clause: "INTAKE".to_string(),
        timestamp: U256::from(1_700_000_000u64),
        attestor: Address::repeat_byte(0x0A),
    }
}

fn document_stored(asset: u8) -> ICustodyVault::DocumentStored {
    ICustodyVault::DocumentStored {
        assetId: B256::repeat_byte(asset),
        docHash: B256::repeat_byte(0xD0),
        actor: Address::repeat_byte(0x0B),
    }
}

async fn seed_two_events(chain: &StubChain) {
    chain
        .push_log(StubChain::event_log(ATTESTOR, &attested(1), 5, B256::repeat_byte(0x05), 0))
        .await;
    chain
        .push_log(StubChain::event_log(
            CUSTODY_VAULT,
            &document_stored(2),
            9,
            B256::repeat_byte(0x09),
            0,
        ))
        .await;
    chain.set_head(12).await;
}

#[tokio::test]
async fn test_fresh_ingestion_persists_and_advances() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");
    let outcome = subscriber.tick().await.unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!((summary.from_block, summary.to_block), (1, 12));
    assert_eq!(summary.inserted, 2);
    assert_eq!(store.count_events().await.unwrap(), 2);
    assert_eq!(subscriber.cursor().await.unwrap(), 12);

    let attested = store
        .find_events(&EventQuery::new().module(Module::Attestor))
        .await
        .unwrap();
    assert_eq!(attested.len(), 1);
    assert_eq!(attested[0].event_kind, "Attested");
    assert_eq!(attested[0].block_number, 5);
    assert_eq!(attested[0].correlation_hash, format!("{:#x}", B256::repeat_byte(0x52)));

    let stored = store
        .find_events(&EventQuery::new().module(Module::CustodyVault))
        .await
        .unwrap();
    assert_eq!(stored[0].event_kind, "DocumentStored");

    let audit = store.list_audit(1).await.unwrap();
    assert_eq!(audit[0].action, actions::CHAIN_INGEST);
    assert_eq!(audit[0].payload["inserted"], 2);
}

#[tokio::test]
async fn test_no_addresses_makes_no_requests() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;

    let subscriber = EventSubscriber::new(
        chain.clone(),
        Arc::new(ContractAddressSet::empty()),
        store.clone(),
        "chain_events",
    );

    assert_eq!(subscriber.tick().await.unwrap(), TickOutcome::NoAddresses);
    assert_eq!(chain.get_logs_calls(), 0);
    assert_eq!(chain.block_number_calls(), 0);
    assert!(store.get_cursor("chain_events").await.unwrap().is_none());
    assert_eq!(store.count_events().await.unwrap(), 0);
}

#[tokio::test]
async fn test_crash_before_cursor_advance_reingests_without_duplicates() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(FlakyStore::new());
    seed_two_events(&chain).await;
    store.fail_next_advance();

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");

    assert!(subscriber.tick().await.is_err());
    // Events landed, the cursor did not
    assert_eq!(store.count_events().await.unwrap(), 2);
    assert_eq!(subscriber.cursor().await.unwrap(), 0);

    let outcome = subscriber.tick().await.unwrap();
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(store.count_events().await.unwrap(), 2);
    assert_eq!(subscriber.cursor().await.unwrap(), 12);
    assert_eq!(chain.requested_ranges().await, vec![(1, 12), (1, 12)]);
}

#[tokio::test]
async fn test_failed_head_read_leaves_cursor() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;
    chain.fail_next_block_number("timeout").await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");

    let err = subscriber.tick().await.unwrap_err();
    assert_eq!(err.http_status(), 502);
    assert_eq!(chain.get_logs_calls(), 0);
    assert!(store.get_cursor("chain_events").await.unwrap().is_none());

    subscriber.tick().await.unwrap();
    assert_eq!(subscriber.cursor().await.unwrap(), 12);
}

#[tokio::test]
async fn test_unknown_log_is_skipped() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;
    chain
        .push_log(RawLog {
            address: ATTESTOR,
            topics: vec![B256::repeat_byte(0xEE)],
            data: Bytes::new(),
            block_number: Some(7),
            transaction_hash: Some(B256::repeat_byte(0x07)),
            log_index: Some(0),
        })
        .await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");
    let outcome = subscriber.tick().await.unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.logs, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 2);
    assert_eq!(subscriber.cursor().await.unwrap(), 12);
}

#[tokio::test]
async fn test_successive_ticks_cover_adjacent_ranges() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");
    subscriber.tick().await.unwrap();

    chain
        .push_log(StubChain::event_log(ATTESTOR, &attested(3), 15, B256::repeat_byte(0x15), 0))
        .await;
    chain.set_head(20).await;
    let outcome = subscriber.tick().await.unwrap();

    assert_eq!(outcome.summary().unwrap().inserted, 1);
    assert_eq!(chain.requested_ranges().await, vec![(1, 12), (13, 20)]);

    // Head unchanged: no log request
    assert!(matches!(
        subscriber.tick().await.unwrap(),
        TickOutcome::UpToDate { cursor: 20, head: 20 }
    ));
    assert_eq!(chain.get_logs_calls(), 2);
}

#[tokio::test]
async fn test_cursor_survives_restart() {
    let dir = tempdir().unwrap();
    let chain = Arc::new(StubChain::new());
    seed_two_events(&chain).await;

    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let subscriber =
            EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");
        subscriber.tick().await.unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events");

    assert_eq!(subscriber.cursor().await.unwrap(), 12);
    assert!(matches!(subscriber.tick().await.unwrap(), TickOutcome::UpToDate { .. }));
    assert_eq!(chain.get_logs_calls(), 1);
    assert_eq!(store.count_events().await.unwrap(), 2);
}

#[tokio::test]
async fn test_long_range_is_fetched_in_bounded_requests() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events")
        .with_max_range(5);
    let outcome = subscriber.tick().await.unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!((summary.from_block, summary.to_block), (1, 12));
    assert_eq!(summary.logs, 2);
    assert_eq!(summary.inserted, 2);
    assert_eq!(chain.requested_ranges().await, vec![(1, 5), (6, 10), (11, 12)]);
    assert_eq!(subscriber.cursor().await.unwrap(), 12);
}

#[tokio::test]
async fn test_failed_middle_range_keeps_cursor() {
    let chain = Arc::new(StubChain::new());
    let store = Arc::new(MemoryStore::new());
    seed_two_events(&chain).await;
    chain.fail_get_logs_from(6, "response too large").await;

    let subscriber = EventSubscriber::new(chain.clone(), full_addresses(), store.clone(), "chain_events")
        .with_max_range(5);

    assert!(subscriber.tick().await.is_err());
    // First range landed, the cursor did not move
    assert_eq!(store.count_events().await.unwrap(), 1);
    assert_eq!(subscriber.cursor().await.unwrap(), 0);

    let summary = *subscriber.tick().await.unwrap().summary().unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(subscriber.cursor().await.unwrap(), 12);
    assert_eq!(
        chain.requested_ranges().await,
        vec![(1, 5), (6, 10), (1, 5), (6, 10), (11, 12)]
    );
}
