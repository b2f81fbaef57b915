//! Chain Client Abstraction
//!
//! The narrow capability surface the rest of the system needs from a node:
//! current height, logs for an address set and block range, contract state
//! reads (also used to simulate writes), transaction submission, and
//! receipt waiting. Implementations own no indexer state.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use se7en_core::identity_key;

use crate::error::ChainResult;

/// A raw event log as returned by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics, topic0 is the event selector
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed arguments
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl RawLog {
    /// Deduplication key `txHash:logIndex`
    pub fn identity_key(&self) -> String {
        let tx = self.transaction_hash.map(|h| format!("{:#x}", h));
        identity_key(tx.as_deref(), self.log_index)
    }

    /// Event selector, if any
    pub fn selector(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Log query over an inclusive block range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn new(addresses: Vec<Address>, from_block: u64, to_block: u64) -> Self {
        Self {
            addresses,
            from_block,
            to_block,
        }
    }

    /// Whether a log falls inside this filter
    pub fn matches(&self, log: &RawLog) -> bool {
        let in_range = log
            .block_number
            .map(|b| b >= self.from_block && b <= self.to_block)
            .unwrap_or(false);
        in_range && self.addresses.contains(&log.address)
    }
}

/// Contract call parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Sender used for simulation and signing
    pub from: Option<Address>,
    pub to: Address,
    /// Selector plus ABI-encoded arguments
    pub input: Bytes,
}

/// Confirmed transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    /// Execution status (true = success)
    pub success: bool,
    pub gas_used: Option<u64>,
}

/// Node capability interface
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head height
    async fn block_number(&self) -> ChainResult<u64>;

    /// Logs emitted by `filter.addresses` within the inclusive block range
    async fn get_logs(&self, filter: &LogFilter) -> ChainResult<Vec<RawLog>>;

    /// Execute a call against current state without submitting it.
    /// A would-be revert surfaces as `ChainError::Reverted`.
    async fn call(&self, request: &CallRequest) -> ChainResult<Bytes>;

    /// Sign and submit a transaction, returning its hash
    async fn send_transaction(&self, request: &CallRequest) -> ChainResult<B256>;

    /// Block until the receipt for `tx_hash` is available
    async fn wait_for_receipt(&self, tx_hash: B256) -> ChainResult<TxReceipt>;

    /// Account transactions are sent from, if a credential is loaded
    fn signer_address(&self) -> Option<Address>;
}
