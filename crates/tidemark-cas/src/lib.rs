//! Content-addressable storage for Tidemark batch content.
//!
//! Batches of operations are written to a CAS and only their hash travels to
//! the ledger inside the anchor string. This crate defines the
//! [`CasClient`] boundary and an in-memory implementation.
//!
//! # Design Rules
//!
//! 1. Content is immutable once written; the address is the BLAKE3 hash of the bytes.
//! 2. Writes are idempotent: writing the same content twice yields the same hash.
//! 3. Reads are bounded by a caller-supplied maximum size.
//! 4. NotFound, TooLarge and NotAFile are distinct outcomes; only
//!    `Unavailable` is transient.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CasError, CasResult};
pub use memory::InMemoryCas;
pub use traits::CasClient;
