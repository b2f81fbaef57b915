//! Chain Configuration
//!
//! Node endpoint, signing credential and transaction settings.
//! Supports loading from environment variables with the SE7EN_ prefix.
//! Contract addresses are loaded separately into a `ContractAddressSet`.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// Chain connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Hex-encoded operator private key (optional; reads work without it)
    #[serde(default, skip_serializing)]
    pub operator_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Interval between receipt polls in milliseconds
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    /// Give up waiting for a receipt after this many seconds
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    /// Gas limit used when estimation fails
    #[serde(default = "default_gas_limit")]
    pub fallback_gas_limit: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

fn default_receipt_timeout() -> u64 {
    120
}

fn default_gas_limit() -> u64 {
    500_000
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("operator_key", &self.operator_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("receipt_poll_ms", &self.receipt_poll_ms)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .field("fallback_gas_limit", &self.fallback_gas_limit)
            .finish()
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 31337,
            operator_key: None,
            timeout_secs: default_timeout(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_timeout_secs: default_receipt_timeout(),
            fallback_gas_limit: default_gas_limit(),
        }
    }
}

impl ChainConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SE7EN_RPC_URL: JSON-RPC endpoint URL
    /// - SE7EN_CHAIN_ID: chain id
    /// - SE7EN_OPERATOR_KEY: hex private key of the operator account
    /// - SE7EN_RPC_TIMEOUT_SECS: request timeout in seconds
    /// - SE7EN_RECEIPT_POLL_MS: receipt poll interval
    /// - SE7EN_RECEIPT_TIMEOUT_SECS: receipt wait limit
    /// - SE7EN_GAS_LIMIT: fallback gas limit
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env::var("SE7EN_RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_parse("SE7EN_CHAIN_ID").unwrap_or(defaults.chain_id),
            operator_key: env::var("SE7EN_OPERATOR_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            timeout_secs: env_parse("SE7EN_RPC_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            receipt_poll_ms: env_parse("SE7EN_RECEIPT_POLL_MS").unwrap_or(defaults.receipt_poll_ms),
            receipt_timeout_secs: env_parse("SE7EN_RECEIPT_TIMEOUT_SECS")
                .unwrap_or(defaults.receipt_timeout_secs),
            fallback_gas_limit: env_parse("SE7EN_GAS_LIMIT").unwrap_or(defaults.fallback_gas_limit),
        }
    }

    /// Local development node (anvil/hardhat defaults)
    pub fn development() -> Self {
        Self {
            timeout_secs: 10,
            receipt_poll_ms: 250,
            receipt_timeout_secs: 30,
            ..Self::default()
        }
    }

    /// Settings for tests: short timeouts, fast polling
    pub fn test() -> Self {
        Self {
            timeout_secs: 2,
            receipt_poll_ms: 10,
            receipt_timeout_secs: 1,
            ..Self::default()
        }
    }

    /// Number of receipt polls before giving up
    pub fn receipt_attempts(&self) -> u32 {
        let poll = self.receipt_poll_ms.max(1);
        ((self.receipt_timeout_secs * 1_000) / poll).max(1) as u32
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
