//! Storage traits consumed by the observer, resolver and protocol bundles.
//!
//! Any backend (in-memory, filesystem, database) implements these traits.
//! Implementations must be thread-safe (`Send + Sync`); every method is a
//! single atomic step as seen by concurrent readers.

use chrono::{DateTime, Utc};
use tidemark_types::{AnchoredOperation, DidSuffix, Transaction, TransactionNumber, Watermark};

use crate::error::Result;
use crate::types::{QueuedOperation, UnresolvableTransaction};

/// Storage for operations extracted from anchored batches.
pub trait OperationStore: Send + Sync {
    /// Insert all operations of one batch as a single atomic step.
    ///
    /// Re-inserting an identical operation is a no-op, so replaying a
    /// transaction after a crash is safe. Returns the number of operations
    /// that were not already present.
    fn insert_batch(&self, operations: &[AnchoredOperation]) -> Result<usize>;

    /// All operations for `did`, ordered by `(transaction_number, operation_index)`.
    fn get(&self, did: &DidSuffix) -> Result<Vec<AnchoredOperation>>;

    /// Delete every operation anchored after `transaction_number`.
    ///
    /// `None` deletes everything. Returns the number of operations removed.
    fn delete_later_than(&self, transaction_number: Option<TransactionNumber>) -> Result<usize>;

    /// Every stored operation in canonical order.
    fn all(&self) -> Result<Vec<AnchoredOperation>>;

    fn count(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }
}

/// Storage for transactions the observer has processed or must revisit.
pub trait TransactionStore: Send + Sync {
    /// Record a transaction as processed. Numbers must be increasing;
    /// re-recording the most recent transaction is a no-op.
    fn add_processed(&self, transaction: &Transaction) -> Result<()>;

    /// The most recently processed transaction.
    fn last_processed(&self) -> Result<Option<Transaction>>;

    /// Number of processed transactions currently retained.
    fn processed_count(&self) -> Result<u64>;

    /// Up to `take` processed transactions in descending number order,
    /// skipping the `skip` most recent ones.
    fn recent_processed(&self, skip: u64, take: u64) -> Result<Vec<Transaction>>;

    /// Forget processed transactions after `transaction_number` (`None`: all).
    fn remove_processed_later_than(
        &self,
        transaction_number: Option<TransactionNumber>,
    ) -> Result<usize>;

    /// Insert or replace an unresolvable transaction record.
    fn upsert_unresolvable(&self, record: &UnresolvableTransaction) -> Result<()>;

    fn get_unresolvable(
        &self,
        transaction_number: TransactionNumber,
    ) -> Result<Option<UnresolvableTransaction>>;

    /// Records due for retry at `now`, in ascending number order.
    fn unresolvable_due(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<UnresolvableTransaction>>;

    fn remove_unresolvable(&self, transaction_number: TransactionNumber) -> Result<bool>;

    /// Forget unresolvable records after `transaction_number` (`None`: all).
    fn remove_unresolvable_later_than(
        &self,
        transaction_number: Option<TransactionNumber>,
    ) -> Result<usize>;
}

/// FIFO of operation requests waiting for the batch writer.
///
/// At most one pending operation per DID is allowed.
pub trait OperationQueue: Send + Sync {
    /// Append an operation; fails with `AlreadyQueued` if the DID already
    /// has one pending.
    fn enqueue(&self, operation: QueuedOperation) -> Result<()>;

    /// The first `count` operations, without removing them.
    fn peek(&self, count: usize) -> Result<Vec<QueuedOperation>>;

    /// Remove and return the first `count` operations.
    fn dequeue(&self, count: usize) -> Result<Vec<QueuedOperation>>;

    fn contains(&self, did: &DidSuffix) -> Result<bool>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// The observer's single progress record.
pub trait WatermarkStore: Send + Sync {
    /// Returns `Ok(None)` before the first transaction has been processed.
    fn load(&self) -> Result<Option<Watermark>>;

    /// Atomically replace the stored watermark.
    fn save(&self, watermark: &Watermark) -> Result<()>;

    /// Reset to "from genesis".
    fn clear(&self) -> Result<()>;
}
