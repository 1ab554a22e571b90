//! Storage boundaries for Tidemark.
//!
//! Four stores back a node:
//!
//! - [`OperationStore`]: anchored operations, queried per DID in canonical order
//! - [`TransactionStore`]: processed and unresolvable transactions
//! - [`OperationQueue`]: operation requests waiting for the next batch
//! - [`WatermarkStore`]: the observer's single progress record
//!
//! In-memory implementations live in [`memory`]; [`FileWatermarkStore`]
//! persists the watermark with atomic overwrites.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{Result, StoreError};
pub use file::FileWatermarkStore;
pub use memory::{
    InMemoryOperationQueue, InMemoryOperationStore, InMemoryTransactionStore,
    InMemoryWatermarkStore,
};
pub use traits::{OperationQueue, OperationStore, TransactionStore, WatermarkStore};
pub use types::{QueuedOperation, UnresolvableTransaction};
