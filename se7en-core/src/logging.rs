//! Logging setup
//!
//! JSON output for deployed indexers, pretty output for development.
//! `RUST_LOG` always wins over the configured filter.
//!
//! # Conventions
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Aborted ingestion tick or reconciliation pass |
//! | WARN  | Skipped address, per-cycle failure, audit write failure |
//! | INFO  | Tick summary, cycle transition, runner start/stop |
//! | DEBUG | Per-log decode decisions, RPC calls |
//!
//! Key information goes into structured fields (`module`, `tx_hash`,
//! `block`, `cursor`, `cycle_id`, `error`), not into the message text.

use serde::{Deserialize, Serialize};
use std::env;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string (for environment variables)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed for development
    #[default]
    Pretty,
    /// JSON for production
    Json,
    /// Compact single-line
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source file/line
    pub include_source: bool,
    /// Emit span open/close events
    pub include_span_events: bool,
    /// Explicit filter directive, e.g. "se7en_indexer=debug,reqwest=warn"
    pub filter: Option<String>,
    /// Crates that get `level` when no explicit filter is set
    pub targets: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_source: false,
            include_span_events: false,
            filter: None,
            targets: vec![
                "se7en_core".to_string(),
                "se7en_chain".to_string(),
                "se7en_store".to_string(),
                "se7en_indexer".to_string(),
            ],
        }
    }
}

impl LogConfig {
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            include_source: true,
            ..Self::default()
        }
    }

    /// Load from environment
    ///
    /// - SE7EN_LOG_LEVEL: trace/debug/info/warn/error
    /// - SE7EN_LOG_FORMAT: pretty/json/compact
    /// - SE7EN_LOG_FILTER: full filter directive
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = env::var("SE7EN_LOG_LEVEL").ok().and_then(|s| LogLevel::parse(&s)) {
            config.level = level;
        }
        if let Some(format) = env::var("SE7EN_LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::parse(&s))
        {
            config.format = format;
        }
        config.filter = env::var("SE7EN_LOG_FILTER").ok().filter(|s| !s.is_empty());
        config
    }

    /// Filter directive derived from level and targets
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => self
                .targets
                .iter()
                .map(|t| format!("{}={}", t, self.level))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directive())?,
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .pretty()
                    .with_span_events(span_events)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_span_events(span_events)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_from_targets() {
        let config = LogConfig {
            level: LogLevel::Debug,
            targets: vec!["se7en_chain".into(), "se7en_indexer".into()],
            ..LogConfig::default()
        };
        assert_eq!(config.directive(), "se7en_chain=debug,se7en_indexer=debug");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = LogConfig {
            filter: Some("warn".into()),
            ..LogConfig::development()
        };
        assert_eq!(config.directive(), "warn");
    }

    #[test]
    fn test_parse_level_and_format() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
