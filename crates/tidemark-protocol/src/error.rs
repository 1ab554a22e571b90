use tidemark_cas::CasError;
use tidemark_chain::ChainError;
use tidemark_store::StoreError;
use tidemark_types::ContentHash;

/// Errors raised by protocol bundles and the version manager.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The protocol version configuration is unusable. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An anchor, batch or request is invalid. Isolated to the offending
    /// transaction or request.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// The batch content referenced by an anchor is not in the CAS yet.
    #[error("batch content {0} is unavailable")]
    ContentUnavailable(ContentHash),

    #[error("ledger error: {0}")]
    Chain(#[from] ChainError),

    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ProtocolError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedData(message.into())
    }

    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Chain(e) => e.is_transient(),
            Self::Cas(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Why an operation was not applied to a DID's state.
///
/// Rejections are a normal outcome of replay: the operation stays in the
/// store and is reported alongside the resolved state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationRejection {
    #[error("malformed operation: {0}")]
    Malformed(String),

    #[error("DID already created")]
    AlreadyCreated,

    #[error("DID not created")]
    NotCreated,

    #[error("DID is deactivated")]
    Deactivated,

    /// The revealed key does not match the stored commitment.
    #[error("reveal value does not match the current commitment")]
    StaleCommitment,

    #[error("invalid signature")]
    InvalidSignature,

    /// The operation names a different DID than the one it is stored under.
    #[error("operation targets a different DID suffix")]
    SuffixMismatch,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_follows_source() {
        assert!(ProtocolError::from(ChainError::Unavailable("x".into())).is_transient());
        assert!(ProtocolError::from(CasError::Unavailable("x".into())).is_transient());
        assert!(!ProtocolError::from(ChainError::InsufficientFunds {
            required: 2,
            available: 1
        })
        .is_transient());
        assert!(!ProtocolError::malformed("bad").is_transient());
        assert!(!ProtocolError::ContentUnavailable(ContentHash::from_bytes(b"x")).is_transient());
    }
}
