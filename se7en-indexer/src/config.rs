//! Indexer Configuration
//!
//! Supports loading from environment variables with the SE7EN_ prefix.
//! Chain endpoint settings live in `se7en_chain::ChainConfig`.

use se7en_chain::GatewayMode;

use crate::subscriber::DEFAULT_MAX_LOG_RANGE;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default cursor name for chain event ingestion
pub const DEFAULT_CURSOR_NAME: &str = "chain_events";

/// Indexer service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Network label stamped on derived events
    pub network: String,
    /// Sled directory; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Live chain or in-memory stub deployment
    pub gateway_mode: GatewayMode,
    /// Ingestion tick interval in milliseconds
    pub ingest_interval_ms: u64,
    /// Reconciliation pass interval in milliseconds
    pub reconcile_interval_ms: u64,
    /// Maximum cycles examined per reconciliation pass
    pub reconcile_batch: usize,
    /// Maximum block span of one `get_logs` request
    pub max_log_range: u64,
    pub ingest_enabled: bool,
    pub reconcile_enabled: bool,
    /// Name of the durable ingestion cursor
    pub cursor_name: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            network: "local".to_string(),
            data_dir: None,
            gateway_mode: GatewayMode::Rpc,
            ingest_interval_ms: 5_000,
            reconcile_interval_ms: 30_000,
            reconcile_batch: 25,
            max_log_range: DEFAULT_MAX_LOG_RANGE,
            ingest_enabled: true,
            reconcile_enabled: true,
            cursor_name: DEFAULT_CURSOR_NAME.to_string(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SE7EN_NETWORK: network label (default "local")
    /// - SE7EN_DATA_DIR: sled data directory
    /// - SE7EN_GATEWAY_MODE: "rpc" or "stub"
    /// - SE7EN_INGEST_INTERVAL_MS / SE7EN_RECONCILE_INTERVAL_MS: task intervals
    /// - SE7EN_RECONCILE_BATCH: cycles per reconciliation pass
    /// - SE7EN_MAX_LOG_RANGE: blocks per log request (default 2000)
    /// - SE7EN_INGEST_DISABLED / SE7EN_RECONCILE_DISABLED: "true" disables a task
    /// - SE7EN_CURSOR_NAME: ingestion cursor name
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            network: env::var("SE7EN_NETWORK")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.network),
            data_dir: env::var("SE7EN_DATA_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            gateway_mode: env::var("SE7EN_GATEWAY_MODE")
                .ok()
                .and_then(|s| GatewayMode::parse(&s))
                .unwrap_or(defaults.gateway_mode),
            ingest_interval_ms: env_parse("SE7EN_INGEST_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.ingest_interval_ms),
            reconcile_interval_ms: env_parse("SE7EN_RECONCILE_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.reconcile_interval_ms),
            reconcile_batch: env_parse("SE7EN_RECONCILE_BATCH")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reconcile_batch),
            max_log_range: env_parse("SE7EN_MAX_LOG_RANGE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_log_range),
            ingest_enabled: !env_flag("SE7EN_INGEST_DISABLED"),
            reconcile_enabled: !env_flag("SE7EN_RECONCILE_DISABLED"),
            cursor_name: env::var("SE7EN_CURSOR_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.cursor_name),
        }
    }

    /// Stub deployment with fast ticks
    pub fn development() -> Self {
        Self {
            network: "devnet".to_string(),
            gateway_mode: GatewayMode::Stub,
            ingest_interval_ms: 1_000,
            reconcile_interval_ms: 5_000,
            ..Self::default()
        }
    }

    /// In-memory stub with millisecond ticks
    pub fn test() -> Self {
        Self {
            network: "test".to_string(),
            gateway_mode: GatewayMode::Stub,
            ingest_interval_ms: 10,
            reconcile_interval_ms: 10,
            ..Self::default()
        }
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_millis(self.ingest_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.network, "local");
        assert_eq!(config.cursor_name, "chain_events");
        assert_eq!(config.reconcile_batch, 25);
        assert_eq!(config.max_log_range, 2_000);
        assert_eq!(config.ingest_interval(), Duration::from_secs(5));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(30));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_presets_use_stub() {
        assert_eq!(IndexerConfig::development().gateway_mode, GatewayMode::Stub);
        let test = IndexerConfig::test();
        assert_eq!(test.gateway_mode, GatewayMode::Stub);
        assert!(test.ingest_enabled && test.reconcile_enabled);
    }
}
