//! The four capabilities a protocol version provides.
//!
//! Every trait is object-safe and `Send + Sync` so a [`ProtocolBundle`]
//! can hold them as `Arc<dyn ...>` and share them across tasks.
//!
//! [`ProtocolBundle`]: crate::ProtocolBundle

use async_trait::async_trait;
use tidemark_types::{AnchoredOperation, DidSuffix, Transaction};

use crate::error::{OperationRejection, Result};
use crate::state::DidState;

/// Summary of one batch anchored by a [`BatchWriter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenBatch {
    pub anchor_string: String,
    pub operation_count: usize,
    pub fee: u64,
}

/// Drains queued operations into one anchored batch.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// Write one batch. Returns `Ok(None)` when nothing is queued.
    ///
    /// Operations leave the queue only after the ledger write succeeds, so
    /// a failed call can simply be retried.
    async fn write(&self) -> Result<Option<WrittenBatch>>;
}

/// Turns one ledger transaction into stored operations.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Fetch, validate and persist the batch the transaction points at.
    ///
    /// Returns the number of operations newly stored. All of a batch's
    /// operations become visible in one atomic step, or none do.
    async fn process(&self, transaction: &Transaction) -> Result<usize>;
}

/// Applies a single anchored operation to a DID's state.
pub trait OperationProcessor: Send + Sync {
    /// `state` is `None` before the DID has been created.
    fn apply(
        &self,
        operation: &AnchoredOperation,
        state: Option<&DidState>,
    ) -> std::result::Result<DidState, OperationRejection>;
}

/// Accepts operation requests from clients into the operation queue.
pub trait RequestHandler: Send + Sync {
    /// Validate and enqueue `request`, answering with the targeted DID.
    fn handle(&self, request: &[u8]) -> Result<DidSuffix>;
}
