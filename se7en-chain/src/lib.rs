//! se7en Chain Layer
//!
//! Everything that touches the blockchain node:
//!
//! - **Chain Client**: height, logs, calls, raw transactions, receipts
//!   (`JsonRpcClient` over HTTP, `StubChain` in memory)
//! - **Contracts Gateway**: one typed operation per on-chain capability,
//!   simulate → submit → receipt for writes
//! - **Address Guard**: refuses mutating work while modules are unconfigured
//! - **Event Decoder**: ordered per-module candidate signatures, normalized
//!   JSON payloads, `txHash:logIndex` identity keys
//!
//! # Usage
//!
//! ```rust,no_run
//! use se7en_chain::{ChainClient, ChainConfig, EventDecoder, JsonRpcClient, LogFilter};
//! use se7en_core::ContractAddressSet;
//! use std::sync::Arc;
//!
//! async fn example() -> se7en_chain::ChainResult<()> {
//!     let client = JsonRpcClient::new(ChainConfig::from_env())?;
//!     let addresses = Arc::new(ContractAddressSet::from_env());
//!     let decoder = EventDecoder::new(addresses.clone());
//!
//!     let head = client.block_number().await?;
//!     let logs = client
//!         .get_logs(&LogFilter::new(addresses.addresses(), 1, head))
//!         .await?;
//!     let batch = decoder.decode_batch(&logs);
//!     println!("{} events, {} skipped", batch.events.len(), batch.skipped);
//!     Ok(())
//! }
//! ```

pub mod abi;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod rpc;

pub use client::{CallRequest, ChainClient, LogFilter, RawLog, TxReceipt};
pub use config::ChainConfig;
pub use decoder::{DecodeOutcome, DecodedBatch, EventDecoder, EventRegistry, EventSignature};
pub use error::{ChainError, ChainResult};
pub use gateway::{
    decode_clause, encode_clause, AffidavitRecord, AggregateNav, AttestationRecord,
    ContractsGateway, GatewayMode, InstrumentType, NoteRecord, RpcContractsGateway, StubChain,
    StubContractsGateway, TxOutcome, JURISDICTION_TAG, STUB_OPERATOR,
};
pub use guard::{AddressGuard, ModuleStatus};
pub use rpc::JsonRpcClient;
