//! Foundation types for Tidemark.
//!
//! This crate provides the ledger, transaction, and operation types shared by
//! every other Tidemark crate.
//!
//! # Key Types
//!
//! - [`ContentHash`]: Content-addressed identifier (BLAKE3 hash) for CAS blobs
//! - [`BlockchainTime`]: Ledger time paired with a fork-disambiguating hash
//! - [`Transaction`]: One anchor observed on the ledger
//! - [`AnchoredOperation`]: A DID operation bound to the transaction that carried it
//! - [`Watermark`]: Durable marker of the last ingested transaction

pub mod error;
pub mod hash;
pub mod operation;
pub mod time;
pub mod transaction;
pub mod watermark;

pub use error::TypeError;
pub use hash::ContentHash;
pub use operation::{AnchoredOperation, DidSuffix, OperationType};
pub use time::BlockchainTime;
pub use transaction::{Transaction, TransactionNumber};
pub use watermark::Watermark;
