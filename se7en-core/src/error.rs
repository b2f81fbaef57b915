//! Core Error Types

use thiserror::Error;

/// Core error
#[derive(Error, Debug)]
pub enum CoreError {
    /// Backing store failure while writing or reading a record
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied a value that violates a record invariant
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;
