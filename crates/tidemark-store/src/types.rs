//! Records persisted by the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidemark_types::{DidSuffix, OperationType, Transaction};

/// An operation request accepted by a request handler and waiting to be
/// batched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub did_suffix: DidSuffix,
    pub operation_type: OperationType,
    pub operation_buffer: Vec<u8>,
}

/// A transaction whose batch content could not be fetched yet.
///
/// The observer advances past it and retries the fetch on later polls until
/// `attempts` reaches its configured limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvableTransaction {
    pub transaction: Transaction,
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
    pub next_retry_at: DateTime<Utc>,
}

impl UnresolvableTransaction {
    pub fn transaction_number(&self) -> u64 {
        self.transaction.transaction_number
    }

    /// Returns `true` if a retry is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}
