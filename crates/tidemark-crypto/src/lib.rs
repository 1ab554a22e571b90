//! Cryptographic primitives for Tidemark.
//!
//! Provides domain-separated BLAKE3 hashing (DID suffixes, deltas,
//! commitments) and Ed25519 signing/verification for operation authorization.
//!
//! All crypto operations wrap established libraries: no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::{ContentHasher, HasherError};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
