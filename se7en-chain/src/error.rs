//! Chain Layer Error Types
//!
//! Errors raised by the chain client, contracts gateway, address guard
//! and event decoder, with their HTTP status mapping.

use alloy::primitives::Bytes;
use alloy::sol_types::{Revert, SolError};
use alloy::transports::TransportError;
use se7en_core::{CoreError, Module};
use thiserror::Error;

/// EVM JSON-RPC error code for execution reverts
const EXECUTION_REVERTED: i64 = 3;

/// Chain layer error
#[derive(Error, Debug)]
pub enum ChainError {
    /// One or more contract modules have no usable address
    #[error("Contract addresses not configured: {}", format_modules(missing))]
    AddressMissing { missing: Vec<Module> },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Signing credential missing or unusable
    #[error("Signing credential unavailable: {0}")]
    Signing(String),

    /// Simulation says the call would revert
    #[error("Contract call reverted: {reason}")]
    Reverted { reason: String },

    /// Network failure or timeout talking to the node
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// Node answered with a JSON-RPC error object
    #[error("RPC response error {code}: {message}")]
    RpcResponse { code: i64, message: String },

    /// Receipt reported a failed transaction
    #[error("Transaction {tx_hash} failed on-chain")]
    TransactionFailed { tx_hash: String },

    /// Receipt did not appear in time
    #[error("Receipt for {tx_hash} not found after {attempts} attempts")]
    ReceiptTimeout { tx_hash: String, attempts: u32 },

    /// Return data or node payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by a business rule (inactive note, policy block)
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Audit trail write failed
    #[error("Audit error: {0}")]
    Audit(#[from] CoreError),
}

fn format_modules(modules: &[Module]) -> String {
    modules
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ChainError {
    /// HTTP status the API layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            ChainError::AddressMissing { .. } | ChainError::InvalidConfig(_) => 501,
            ChainError::Signing(_) => 428,
            ChainError::Reverted { .. } | ChainError::BusinessRule(_) => 409,
            ChainError::NotFound(_) => 404,
            ChainError::Transport(_)
            | ChainError::RpcResponse { .. }
            | ChainError::TransactionFailed { .. }
            | ChainError::ReceiptTimeout { .. }
            | ChainError::Decode(_) => 502,
            ChainError::Audit(_) => 500,
        }
    }

    /// Whether a later attempt may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Transport(_) | ChainError::ReceiptTimeout { .. } | ChainError::RpcResponse { .. }
        )
    }
}

/// Chain result type
pub type ChainResult<T> = Result<T, ChainError>;

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::Transport(e.to_string())
    }
}

/// Readable revert reason: a decoded `Error(string)`, else the node message
fn revert_reason(message: &str, data: Option<Bytes>) -> String {
    match data {
        Some(bytes) if !bytes.is_empty() => match Revert::abi_decode(&bytes, true) {
            Ok(revert) => revert.reason,
            Err(_) => format!("{} ({})", message, bytes),
        },
        _ => message.to_string(),
    }
}

impl From<TransportError> for ChainError {
    fn from(e: TransportError) -> Self {
        if let Some(payload) = e.as_error_resp() {
            let is_revert = payload.code == EXECUTION_REVERTED
                || payload.message.to_lowercase().contains("revert");
            if is_revert {
                return ChainError::Reverted {
                    reason: revert_reason(&payload.message, payload.as_revert_data()),
                };
            }
            return ChainError::RpcResponse {
                code: payload.code,
                message: payload.message.to_string(),
            };
        }
        if e.is_deser_error() {
            return ChainError::Decode(e.to_string());
        }
        ChainError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Decode(e.to_string())
    }
}

impl From<alloy::sol_types::Error> for ChainError {
    fn from(e: alloy::sol_types::Error) -> Self {
        ChainError::Decode(format!("ABI decode error: {}", e))
    }
}
