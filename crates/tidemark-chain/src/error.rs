/// Errors produced by blockchain client operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("insufficient funds: fee {required} exceeds balance {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("anchor string of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The caller's view of the chain no longer matches the canonical chain.
    #[error("transaction {transaction_number} with time hash {transaction_time_hash} is not on the canonical chain")]
    InvalidTransactionHash {
        transaction_number: u64,
        transaction_time_hash: String,
    },

    #[error("blockchain service unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding in-memory ledger state was poisoned by a panicking writer.
    #[error("ledger lock poisoned: {0}")]
    Poisoned(String),
}

impl ChainError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns `true` if this is the reorg signal.
    pub fn is_fork(&self) -> bool {
        matches!(self, Self::InvalidTransactionHash { .. })
    }
}

/// Result alias for blockchain client operations.
pub type ChainResult<T> = Result<T, ChainError>;
