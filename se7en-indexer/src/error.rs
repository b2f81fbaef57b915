//! Indexer error types

use se7en_chain::ChainError;
use se7en_core::CoreError;
use se7en_store::StoreError;
use thiserror::Error;

/// Indexer error
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Startup configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied value is malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by a business rule
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// The chain call behind an operation failed
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

/// Indexer result type
pub type IndexerResult<T> = Result<T, IndexerError>;

impl IndexerError {
    /// HTTP status an API layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            IndexerError::Chain(e) => e.http_status(),
            IndexerError::Store(_) | IndexerError::Core(_) => 500,
            IndexerError::Config(_) => 501,
            IndexerError::InvalidInput(_) => 400,
            IndexerError::NotFound(_) => 404,
            IndexerError::BusinessRule(_) => 409,
            IndexerError::Upstream(_) => 502,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            IndexerError::Config(_) => 1,
            IndexerError::InvalidInput(_) => 2,
            IndexerError::Chain(ChainError::AddressMissing { .. }) => 3,
            IndexerError::Chain(_) | IndexerError::Upstream(_) => 4,
            IndexerError::Store(_) | IndexerError::Core(_) => 5,
            IndexerError::NotFound(_) => 21,
            IndexerError::BusinessRule(_) => 22,
        }
    }
}
