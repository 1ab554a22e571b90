//! Error types for store operations.

use thiserror::Error;
use tidemark_types::DidSuffix;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A different operation is already stored under the same
    /// `(transaction_number, operation_index)` key.
    #[error("conflicting operation at transaction {transaction_number} index {operation_index}")]
    Conflict {
        transaction_number: u64,
        operation_index: u32,
    },

    /// The queue already holds a pending operation for this DID.
    #[error("an operation for {0} is already queued")]
    AlreadyQueued(DidSuffix),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based store operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
