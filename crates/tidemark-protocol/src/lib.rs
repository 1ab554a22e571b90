//! Versioned protocol behavior for Tidemark.
//!
//! A protocol version decides how batches are encoded, how large they may
//! be, what they cost, and how each DID operation changes state. Each
//! version is packaged as a [`ProtocolBundle`] exposing four capabilities:
//!
//! - [`BatchWriter`] drains the operation queue into one anchored batch
//! - [`TransactionProcessor`] turns a ledger transaction into stored operations
//! - [`OperationProcessor`] applies one operation to a DID's state
//! - [`RequestHandler`] validates client requests into the queue
//!
//! The [`VersionManager`] selects the bundle in force at a given ledger time.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tidemark_cas::InMemoryCas;
//! use tidemark_chain::InMemoryBlockchain;
//! use tidemark_protocol::{ProtocolContext, ProtocolVersionConfig, ProtocolVersionId, VersionManager};
//! use tidemark_store::{InMemoryOperationQueue, InMemoryOperationStore};
//!
//! let context = ProtocolContext {
//!     chain: Arc::new(InMemoryBlockchain::default()),
//!     cas: Arc::new(InMemoryCas::new()),
//!     operation_store: Arc::new(InMemoryOperationStore::new()),
//!     queue: Arc::new(InMemoryOperationQueue::new()),
//! };
//! let schedule = vec![
//!     ProtocolVersionConfig::new(0, "v1"),
//!     ProtocolVersionConfig::new(1000, "v2"),
//! ];
//! let manager = VersionManager::new(&schedule, &context).unwrap();
//! assert_eq!(manager.version_for(999).unwrap().version(), ProtocolVersionId::V1);
//! assert_eq!(manager.version_for(1000).unwrap().version(), ProtocolVersionId::V2);
//! ```

pub mod anchor;
pub mod bundle;
pub mod codec;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod manager;
pub mod operation;
pub mod processor;
pub mod state;
pub mod traits;
pub mod version;
pub mod writer;

pub use anchor::AnchorString;
pub use bundle::{ProtocolBundle, ProtocolContext};
pub use codec::{BatchCodec, OperationBatch};
pub use error::{OperationRejection, ProtocolError, Result};
pub use handler::DefaultRequestHandler;
pub use ingest::DefaultTransactionProcessor;
pub use manager::{validate_schedule, ProtocolVersionConfig, VersionManager};
pub use operation::{
    CreateRequest, DeactivateRequest, Delta, OperationRequest, Patch, RecoverRequest, SuffixData,
    UpdateRequest,
};
pub use processor::DefaultOperationProcessor;
pub use state::{apply_patch, DidState};
pub use traits::{BatchWriter, OperationProcessor, RequestHandler, TransactionProcessor, WrittenBatch};
pub use version::{FeeModel, ProtocolParameters, ProtocolVersionId};
pub use writer::DefaultBatchWriter;
