//! Store error types

use se7en_core::CoreError;
use thiserror::Error;

/// Store error
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing database failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because it would violate a record invariant
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Serialization(e) => CoreError::Serialization(e),
            StoreError::InvalidInput(msg) => CoreError::InvalidInput(msg),
            other => CoreError::Storage(other.to_string()),
        }
    }
}
