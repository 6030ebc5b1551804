//! Error types for value store operations

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing a value store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No stored value exists where one was required
    #[error("No stored value at {0}")]
    Missing(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store does not support the requested operation
    #[error("Unsupported store operation: {0}")]
    Unsupported(String),
}
