use thiserror::Error;
use tidemark_chain::ChainError;
use tidemark_protocol::ProtocolError;
use tidemark_store::StoreError;
use tidemark_types::DidSuffix;

use crate::resolver::ResolvedDid;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid node configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external call timed out or kept failing after retries.
    #[error("transient infrastructure error: {0}")]
    Transient(String),

    /// The fork is deeper than the configured search ceiling.
    #[error("unrecoverable fork: no valid transaction within {depth} processed transactions")]
    UnrecoverableFork { depth: u64 },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("ledger error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Returns `true` if the same call may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Chain(e) => e.is_transient(),
            Self::Protocol(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this is the ledger's reorg signal.
    pub fn is_fork(&self) -> bool {
        matches!(self, Self::Chain(e) if e.is_fork())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Outcome of a resolution that did not produce a live DID.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("DID {0} not found")]
    NotFound(DidSuffix),

    /// The DID exists but has been deactivated. The final replay is kept
    /// for callers that want to show its history.
    #[error("DID {} is deactivated", .resolved.did_suffix)]
    Deactivated { resolved: Box<ResolvedDid> },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
