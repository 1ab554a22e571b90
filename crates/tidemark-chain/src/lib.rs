//! Ledger boundary for Tidemark.
//!
//! The ledger is an append-only, publicly readable log with eventual rather
//! than immediate finality. This crate provides:
//! - The [`BlockchainClient`] trait consumed by the batch writer and observer
//! - [`ChainError`], including the distinguished reorg signal
//! - [`InMemoryBlockchain`], a forkable ledger for tests, demos and embedding

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{ChainError, ChainResult};
pub use memory::{ChainConfig, InMemoryBlockchain};
pub use traits::{BlockchainClient, ReadResult, ServiceVersion};
