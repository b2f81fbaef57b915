//! Event Subscriber
//!
//! One tick: read the head, read the cursor, fetch logs for
//! `[cursor + 1, head]` from every configured contract in ranges of at
//! most `max_range` blocks, decode, persist, then advance the cursor to
//! the head observed at tick start. Events are always written before the
//! cursor moves, so an aborted tick is simply retried over the same range
//! and the store drops the repeats.

use se7en_chain::{ChainClient, EventDecoder, LogFilter};
use se7en_core::{actions, AuditEntry, AuditLog, AuditOutcome, ContractAddressSet};
use se7en_store::{IndexerStore, InsertOutcome};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::IndexerResult;

/// Blocks per `get_logs` request unless configured otherwise
pub const DEFAULT_MAX_LOG_RANGE: u64 = 2_000;

/// Counters for a tick that advanced the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub from_block: u64,
    pub to_block: u64,
    /// Raw logs returned by the node
    pub logs: usize,
    pub inserted: usize,
    /// Already stored, or repeated within the batch
    pub duplicates: usize,
    /// Logs matching no known event
    pub skipped: usize,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No contract addresses configured; nothing was requested
    NoAddresses,
    /// Head has not moved past the cursor
    UpToDate { cursor: u64, head: u64 },
    /// Range processed and cursor advanced
    Advanced(TickSummary),
}

impl TickOutcome {
    pub fn summary(&self) -> Option<&TickSummary> {
        match self {
            TickOutcome::Advanced(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Resumable polling ingester
pub struct EventSubscriber {
    client: Arc<dyn ChainClient>,
    decoder: EventDecoder,
    store: Arc<dyn IndexerStore>,
    cursor_name: String,
    max_range: u64,
}

impl EventSubscriber {
    pub fn new(
        client: Arc<dyn ChainClient>,
        addresses: Arc<ContractAddressSet>,
        store: Arc<dyn IndexerStore>,
        cursor_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            decoder: EventDecoder::new(addresses),
            store,
            cursor_name: cursor_name.into(),
            max_range: DEFAULT_MAX_LOG_RANGE,
        }
    }

    /// Cap the block span of each `get_logs` request
    pub fn with_max_range(mut self, blocks: u64) -> Self {
        self.max_range = blocks.max(1);
        self
    }

    pub fn cursor_name(&self) -> &str {
        &self.cursor_name
    }

    /// Stored cursor position, 0 when absent
    pub async fn cursor(&self) -> IndexerResult<u64> {
        Ok(self
            .store
            .get_cursor(&self.cursor_name)
            .await?
            .map(|c| c.last_processed_block)
            .unwrap_or(0))
    }

    /// Run one ingestion tick
    #[instrument(skip(self), fields(cursor = %self.cursor_name))]
    pub async fn tick(&self) -> IndexerResult<TickOutcome> {
        if self.decoder.addresses().is_empty() {
            debug!("No contract addresses configured, skipping tick");
            return Ok(TickOutcome::NoAddresses);
        }

        match self.ingest().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Ingestion tick aborted, cursor unchanged");
                self.audit_failure(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn ingest(&self) -> IndexerResult<TickOutcome> {
        let head = self.client.block_number().await?;
        let cursor = self.cursor().await?;
        if head <= cursor {
            debug!(head, cursor, "Chain head not past cursor");
            return Ok(TickOutcome::UpToDate { cursor, head });
        }

        let from_block = cursor + 1;
        let addresses = self.decoder.addresses().addresses();
        let mut summary = TickSummary {
            from_block,
            to_block: head,
            ..Default::default()
        };

        for (start, end) in block_ranges(from_block, head, self.max_range) {
            let filter = LogFilter::new(addresses.clone(), start, end);
            let logs = self.client.get_logs(&filter).await?;
            let batch = self.decoder.decode_batch(&logs);
            summary.logs += logs.len();
            summary.duplicates += batch.duplicates;
            summary.skipped += batch.skipped;

            for event in &batch.events {
                match self.store.insert_event(event).await? {
                    InsertOutcome::Inserted => summary.inserted += 1,
                    InsertOutcome::Duplicate => summary.duplicates += 1,
                }
            }
            debug!(from_block = start, to_block = end, logs = logs.len(), "Log range stored");
        }

        // Only after every range is stored
        let stored = self.store.advance_cursor(&self.cursor_name, head).await?;

        info!(
            from_block,
            to_block = head,
            cursor = stored.last_processed_block,
            logs = summary.logs,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "Ingestion tick complete"
        );

        let entry = AuditEntry::new(actions::CHAIN_INGEST, "system")
            .with_payload(serde_json::json!({
                "cursor": self.cursor_name,
                "fromBlock": from_block,
                "toBlock": head,
                "logs": summary.logs,
                "inserted": summary.inserted,
                "duplicates": summary.duplicates,
                "skipped": summary.skipped,
            }))
            .with_outcome(AuditOutcome::Ok);
        if let Err(e) = self.store.append(entry).await {
            warn!(error = %e, "Failed to audit ingestion tick");
        }

        Ok(TickOutcome::Advanced(summary))
    }

    async fn audit_failure(&self, reason: &str) {
        let entry = AuditEntry::new(actions::CHAIN_INGEST, "system")
            .with_payload(serde_json::json!({
                "cursor": self.cursor_name,
                "error": reason,
            }))
            .with_outcome(AuditOutcome::Error);
        if let Err(e) = self.store.append(entry).await {
            warn!(error = %e, "Failed to audit aborted tick");
        }
    }
}

/// Consecutive inclusive ranges of at most `span` blocks covering `[from, to]`
fn block_ranges(from: u64, to: u64, span: u64) -> impl Iterator<Item = (u64, u64)> {
    let span = span.max(1);
    std::iter::successors(Some(from).filter(|start| *start <= to), move |start| {
        start.checked_add(span).filter(|next| *next <= to)
    })
    .map(move |start| (start, start.saturating_add(span - 1).min(to)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use se7en_chain::abi::IAttestor;
    use se7en_chain::StubChain;
    use se7en_core::Module;
    use se7en_store::MemoryStore;

    fn attested(subject: u8) -> IAttestor::Attested {
        IAttestor::Attested {
            attestationId: B256::repeat_byte(subject),
            subjectId: B256::repeat_byte(0x51),
            payloadHash: B256::repeat_byte(0x52),
            jurisdiction: "test".to_string(),
            clause: "INTAKE".to_string(),
            timestamp: U256::from(1_700_000_000u64),
            attestor: Address::repeat_byte(0x0A),
        }
    }

    #[test]
    fn test_block_ranges() {
        let ranges: Vec<_> = block_ranges(1, 12, 5).collect();
        assert_eq!(ranges, vec![(1, 5), (6, 10), (11, 12)]);
        assert_eq!(block_ranges(7, 7, 5).collect::<Vec<_>>(), vec![(7, 7)]);
        assert_eq!(block_ranges(1, 4, 0).count(), 4);
        assert_eq!(block_ranges(9, 4, 5).count(), 0);
        assert_eq!(
            block_ranges(u64::MAX - 1, u64::MAX, 10).collect::<Vec<_>>(),
            vec![(u64::MAX - 1, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn test_head_behind_cursor_is_noop() {
        let attestor = Address::repeat_byte(0xA1);
        let chain = Arc::new(StubChain::new());
        let store = Arc::new(MemoryStore::new());
        store.advance_cursor("chain_events", 10).await.unwrap();
        chain.set_head(10).await;

        let subscriber = EventSubscriber::new(
            chain.clone(),
            Arc::new(ContractAddressSet::empty().with(Module::Attestor, attestor)),
            store.clone(),
            "chain_events",
        );
        let outcome = subscriber.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::UpToDate { cursor: 10, head: 10 });
        assert_eq!(chain.get_logs_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_logs_call_keeps_cursor() {
        let attestor = Address::repeat_byte(0xA1);
        let chain = Arc::new(StubChain::new());
        let store = Arc::new(MemoryStore::new());
        chain.set_head(4).await;
        chain
            .push_log(StubChain::event_log(attestor, &attested(1), 3, B256::repeat_byte(7), 0))
            .await;
        chain.fail_next_get_logs("connection reset").await;

        let subscriber = EventSubscriber::new(
            chain.clone(),
            Arc::new(ContractAddressSet::empty().with(Module::Attestor, attestor)),
            store.clone(),
            "chain_events",
        );

        assert!(subscriber.tick().await.is_err());
        assert_eq!(subscriber.cursor().await.unwrap(), 0);
        let audit = store.list_audit(1).await.unwrap();
        assert_eq!(audit[0].action, actions::CHAIN_INGEST);
        assert_eq!(audit[0].payload["result"], "error");

        let outcome = subscriber.tick().await.unwrap();
        assert_eq!(outcome.summary().unwrap().inserted, 1);
        assert_eq!(subscriber.cursor().await.unwrap(), 4);
        assert_eq!(chain.requested_ranges().await, vec![(1, 4), (1, 4)]);
    }
}
