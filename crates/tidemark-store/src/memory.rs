//! In-memory stores for testing, the demo node and ephemeral use.
//!
//! Every store keeps its state behind a single `RwLock`, so each trait method
//! is atomic with respect to concurrent readers. Data is lost when the store
//! is dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tidemark_types::{AnchoredOperation, DidSuffix, Transaction, TransactionNumber, Watermark};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::{OperationQueue, OperationStore, TransactionStore, WatermarkStore};
use crate::types::{QueuedOperation, UnresolvableTransaction};

fn poisoned<T>(e: PoisonError<T>) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

type OperationKey = (TransactionNumber, u32);

#[derive(Default)]
struct OperationState {
    operations: BTreeMap<OperationKey, AnchoredOperation>,
    by_did: HashMap<DidSuffix, BTreeSet<OperationKey>>,
}

/// An in-memory implementation of [`OperationStore`].
#[derive(Default)]
pub struct InMemoryOperationStore {
    inner: RwLock<OperationState>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationStore for InMemoryOperationStore {
    fn insert_batch(&self, operations: &[AnchoredOperation]) -> Result<usize> {
        let mut state = self.inner.write().map_err(poisoned)?;

        // Validate the whole batch before touching state so a conflict leaves
        // nothing half-inserted.
        let mut fresh = Vec::with_capacity(operations.len());
        for op in operations {
            match state.operations.get(&op.ordering_key()) {
                Some(existing) if existing == op => {}
                Some(_) => {
                    return Err(StoreError::Conflict {
                        transaction_number: op.transaction_number,
                        operation_index: op.operation_index,
                    })
                }
                None => fresh.push(op),
            }
        }

        for op in &fresh {
            state
                .by_did
                .entry(op.did_suffix.clone())
                .or_default()
                .insert(op.ordering_key());
            state.operations.insert(op.ordering_key(), (*op).clone());
        }
        Ok(fresh.len())
    }

    fn get(&self, did: &DidSuffix) -> Result<Vec<AnchoredOperation>> {
        let state = self.inner.read().map_err(poisoned)?;
        let Some(keys) = state.by_did.get(did) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| state.operations.get(key).cloned())
            .collect())
    }

    fn delete_later_than(&self, transaction_number: Option<TransactionNumber>) -> Result<usize> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let removed: Vec<AnchoredOperation> = match transaction_number {
            None => std::mem::take(&mut state.operations).into_values().collect(),
            Some(n) => match n.checked_add(1) {
                Some(next) => state.operations.split_off(&(next, 0)).into_values().collect(),
                None => Vec::new(),
            },
        };

        for op in &removed {
            if let Some(keys) = state.by_did.get_mut(&op.did_suffix) {
                keys.remove(&op.ordering_key());
                if keys.is_empty() {
                    state.by_did.remove(&op.did_suffix);
                }
            }
        }
        debug!(?transaction_number, removed = removed.len(), "operations reverted");
        Ok(removed.len())
    }

    fn all(&self) -> Result<Vec<AnchoredOperation>> {
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state.operations.values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.operations.len())
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransactionState {
    processed: VecDeque<Transaction>,
    unresolvable: BTreeMap<TransactionNumber, UnresolvableTransaction>,
}

/// An in-memory implementation of [`TransactionStore`].
///
/// With a retention limit the processed log behaves as a ring buffer: only
/// the most recent `retention` transactions are kept.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    retention: Option<usize>,
    inner: RwLock<TransactionState>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` processed transactions.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            retention: Some(retention.max(1)),
            inner: RwLock::default(),
        }
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn add_processed(&self, transaction: &Transaction) -> Result<()> {
        let mut state = self.inner.write().map_err(poisoned)?;
        if let Some(last) = state.processed.back() {
            // Replaying the last transaction after a crash is a no-op.
            if last.is_same_entry(transaction) {
                return Ok(());
            }
            if last.transaction_number >= transaction.transaction_number {
                return Err(StoreError::Conflict {
                    transaction_number: transaction.transaction_number,
                    operation_index: 0,
                });
            }
        }
        state.processed.push_back(transaction.clone());
        if let Some(limit) = self.retention {
            while state.processed.len() > limit {
                state.processed.pop_front();
            }
        }
        Ok(())
    }

    fn last_processed(&self) -> Result<Option<Transaction>> {
        Ok(self.inner.read().map_err(poisoned)?.processed.back().cloned())
    }

    fn processed_count(&self) -> Result<u64> {
        Ok(self.inner.read().map_err(poisoned)?.processed.len() as u64)
    }

    fn recent_processed(&self, skip: u64, take: u64) -> Result<Vec<Transaction>> {
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state
            .processed
            .iter()
            .rev()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }

    fn remove_processed_later_than(
        &self,
        transaction_number: Option<TransactionNumber>,
    ) -> Result<usize> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let before = state.processed.len();
        match transaction_number {
            None => state.processed.clear(),
            Some(n) => state.processed.retain(|t| t.transaction_number <= n),
        }
        Ok(before - state.processed.len())
    }

    fn upsert_unresolvable(&self, record: &UnresolvableTransaction) -> Result<()> {
        self.inner
            .write()
            .map_err(poisoned)?
            .unresolvable
            .insert(record.transaction_number(), record.clone());
        Ok(())
    }

    fn get_unresolvable(
        &self,
        transaction_number: TransactionNumber,
    ) -> Result<Option<UnresolvableTransaction>> {
        Ok(self
            .inner
            .read()
            .map_err(poisoned)?
            .unresolvable
            .get(&transaction_number)
            .cloned())
    }

    fn unresolvable_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UnresolvableTransaction>> {
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state
            .unresolvable
            .values()
            .filter(|record| record.is_due(now))
            .take(limit)
            .cloned()
            .collect())
    }

    fn remove_unresolvable(&self, transaction_number: TransactionNumber) -> Result<bool> {
        Ok(self
            .inner
            .write()
            .map_err(poisoned)?
            .unresolvable
            .remove(&transaction_number)
            .is_some())
    }

    fn remove_unresolvable_later_than(
        &self,
        transaction_number: Option<TransactionNumber>,
    ) -> Result<usize> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let removed = match transaction_number {
            None => std::mem::take(&mut state.unresolvable).len(),
            Some(n) => match n.checked_add(1) {
                Some(next) => state.unresolvable.split_off(&next).len(),
                None => 0,
            },
        };
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// An in-memory implementation of [`OperationQueue`].
#[derive(Default)]
pub struct InMemoryOperationQueue {
    inner: RwLock<VecDeque<QueuedOperation>>,
}

impl InMemoryOperationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationQueue for InMemoryOperationQueue {
    fn enqueue(&self, operation: QueuedOperation) -> Result<()> {
        let mut queue = self.inner.write().map_err(poisoned)?;
        if queue.iter().any(|q| q.did_suffix == operation.did_suffix) {
            return Err(StoreError::AlreadyQueued(operation.did_suffix));
        }
        queue.push_back(operation);
        Ok(())
    }

    fn peek(&self, count: usize) -> Result<Vec<QueuedOperation>> {
        let queue = self.inner.read().map_err(poisoned)?;
        Ok(queue.iter().take(count).cloned().collect())
    }

    fn dequeue(&self, count: usize) -> Result<Vec<QueuedOperation>> {
        let mut queue = self.inner.write().map_err(poisoned)?;
        let count = count.min(queue.len());
        Ok(queue.drain(..count).collect())
    }

    fn contains(&self, did: &DidSuffix) -> Result<bool> {
        let queue = self.inner.read().map_err(poisoned)?;
        Ok(queue.iter().any(|q| &q.did_suffix == did))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.len())
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// An in-memory implementation of [`WatermarkStore`].
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    inner: RwLock<Option<Watermark>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for InMemoryWatermarkStore {
    fn load(&self) -> Result<Option<Watermark>> {
        Ok(self.inner.read().map_err(poisoned)?.clone())
    }

    fn save(&self, watermark: &Watermark) -> Result<()> {
        *self.inner.write().map_err(poisoned)? = Some(watermark.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.write().map_err(poisoned)? = None;
        Ok(())
    }
}
