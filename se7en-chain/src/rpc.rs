//! Ethereum JSON-RPC Client
//!
//! `ChainClient` over an alloy HTTP provider. Transactions are signed
//! locally with the operator key and submitted raw.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{
    PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder, RootProvider,
    WatchTxError,
};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::eth::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::Http;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{CallRequest, ChainClient, LogFilter, RawLog, TxReceipt};
use crate::config::ChainConfig;
use crate::error::{ChainError, ChainResult};

/// JSON-RPC client for an EVM node
pub struct JsonRpcClient {
    provider: RootProvider<Http<Client>>,
    /// Connection configuration
    config: ChainConfig,
    /// Operator signer, absent in read-only deployments
    signer: Option<PrivateKeySigner>,
}

impl JsonRpcClient {
    /// Create a new client. An invalid URL or operator key is a
    /// configuration error.
    pub fn new(config: ChainConfig) -> ChainResult<Self> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidConfig(format!("invalid rpc url {}: {}", config.rpc_url, e)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let rpc = RpcClient::new(Http::with_client(http, url), false)
            .with_poll_interval(Duration::from_millis(config.receipt_poll_ms.max(1)));
        let provider = ProviderBuilder::new().on_client(rpc);

        let signer = match &config.operator_key {
            Some(key) => Some(
                PrivateKeySigner::from_str(key.trim_start_matches("0x"))
                    .map_err(|e| ChainError::Signing(format!("invalid operator key: {}", e)))?,
            ),
            None => None,
        };

        if let Some(signer) = &signer {
            info!(operator = %signer.address(), rpc_url = %config.rpc_url, "JSON-RPC client ready");
        } else {
            info!(rpc_url = %config.rpc_url, "JSON-RPC client ready (read-only)");
        }

        Ok(Self {
            provider,
            config,
            signer,
        })
    }

    /// Gas estimate with 20% headroom, falling back to the configured limit
    async fn estimate_gas(&self, tx: &TransactionRequest) -> u64 {
        match self.provider.estimate_gas(tx).await {
            Ok(gas) => gas.saturating_add(gas / 5),
            Err(e) => {
                let e = ChainError::from(e);
                warn!(error = %e, fallback = self.config.fallback_gas_limit, "Gas estimation failed");
                self.config.fallback_gas_limit
            }
        }
    }
}

fn call_request(request: &CallRequest) -> TransactionRequest {
    let tx = TransactionRequest::default()
        .with_to(request.to)
        .with_input(request.input.clone());
    match request.from {
        Some(from) => tx.with_from(from),
        None => tx,
    }
}

/// Filter for `eth_getLogs` over an inclusive block range
fn log_filter(filter: &LogFilter) -> Filter {
    Filter::new()
        .address(filter.addresses.clone())
        .from_block(filter.from_block)
        .to_block(filter.to_block)
}

/// `None` for logs a reorg removed
fn raw_log(log: Log) -> Option<RawLog> {
    if log.removed {
        debug!(tx_hash = ?log.transaction_hash, "Dropping log removed by reorg");
        return None;
    }
    Some(RawLog {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

fn tx_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        success: receipt.status(),
        gas_used: u64::try_from(receipt.gas_used).ok(),
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_logs(&self, filter: &LogFilter) -> ChainResult<Vec<RawLog>> {
        let logs = self.provider.get_logs(&log_filter(filter)).await?;
        Ok(logs.into_iter().filter_map(raw_log).collect())
    }

    async fn call(&self, request: &CallRequest) -> ChainResult<Bytes> {
        Ok(self.provider.call(&call_request(request)).await?)
    }

    async fn send_transaction(&self, request: &CallRequest) -> ChainResult<B256> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ChainError::Signing("no operator key configured".to_string()))?;
        let from = signer.address();

        let nonce = self.provider.get_transaction_count(from).pending().await?;
        let gas_price = self.provider.get_gas_price().await?;
        let base = call_request(request).with_from(from);
        let gas_limit = self.estimate_gas(&base).await;

        let tx = base
            .with_chain_id(self.config.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price);

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = tx
            .build(&wallet)
            .await
            .map_err(|e| ChainError::Signing(format!("transaction signing failed: {}", e)))?;

        let pending = self
            .provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await?;
        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, to = %request.to, "Transaction submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> ChainResult<TxReceipt> {
        let timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await;

        match receipt {
            Ok(receipt) => Ok(tx_receipt(&receipt)),
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                Err(ChainError::ReceiptTimeout {
                    tx_hash: format!("{:#x}", tx_hash),
                    attempts: self.config.receipt_attempts(),
                })
            }
            Err(PendingTransactionError::TransportError(e)) => Err(e.into()),
            Err(e) => Err(ChainError::Transport(e.to_string())),
        }
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, LogData};

    fn node_log(removed: bool) -> Log {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x11)], Bytes::from_static(b"\x01"));
        Log {
            inner: PrimitiveLog {
                address: Address::repeat_byte(0xA1),
                data,
            },
            block_number: Some(5),
            transaction_hash: Some(B256::repeat_byte(0xAB)),
            log_index: Some(2),
            removed,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_operator_key_rejected() {
        let config = ChainConfig {
            operator_key: Some("not-a-key".into()),
            ..ChainConfig::test()
        };
        assert!(matches!(JsonRpcClient::new(config), Err(ChainError::Signing(_))));
    }

    #[test]
    fn test_invalid_rpc_url_rejected() {
        let config = ChainConfig {
            rpc_url: "not a url".into(),
            ..ChainConfig::test()
        };
        assert!(matches!(JsonRpcClient::new(config), Err(ChainError::InvalidConfig(_))));
    }

    #[test]
    fn test_read_only_client_has_no_signer() {
        let client = JsonRpcClient::new(ChainConfig::test()).unwrap();
        assert!(client.signer_address().is_none());
    }

    #[test]
    fn test_node_log_conversion() {
        let log = raw_log(node_log(false)).unwrap();
        assert_eq!(log.address, Address::repeat_byte(0xA1));
        assert_eq!(log.topics, vec![B256::repeat_byte(0x11)]);
        assert_eq!(log.data, Bytes::from_static(b"\x01"));
        assert_eq!(log.block_number, Some(5));
        assert_eq!(log.log_index, Some(2));

        assert!(raw_log(node_log(true)).is_none());
    }

    #[test]
    fn test_log_filter_covers_inclusive_range() {
        let filter = log_filter(&LogFilter::new(vec![Address::repeat_byte(0xA1)], 6, 10));
        assert_eq!(filter.get_from_block(), Some(6));
        assert_eq!(filter.get_to_block(), Some(10));
        assert!(filter.address.matches(&Address::repeat_byte(0xA1)));
        assert!(!filter.address.matches(&Address::repeat_byte(0xA2)));
    }

    #[test]
    fn test_call_request_carries_sender() {
        let request = CallRequest {
            from: Some(Address::repeat_byte(0x0F)),
            to: Address::repeat_byte(0xC1),
            input: Bytes::from_static(b"\xde\xad"),
        };
        let tx = call_request(&request);
        assert_eq!(tx.from, Some(Address::repeat_byte(0x0F)));
        assert_eq!(tx.input.input(), Some(&Bytes::from_static(b"\xde\xad")));
    }
}
