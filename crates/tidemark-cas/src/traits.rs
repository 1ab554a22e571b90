use async_trait::async_trait;
use bytes::Bytes;
use tidemark_types::ContentHash;

use crate::error::CasResult;

/// Content-addressable storage client.
///
/// All implementations must satisfy these invariants:
/// - The hash returned by `write` is the BLAKE3 hash of the content.
/// - Writing content that already exists is a no-op returning the same hash.
/// - `read` never returns more than `max_size` bytes; larger content fails
///   with `TooLarge` before it is transferred.
#[async_trait]
pub trait CasClient: Send + Sync {
    /// Store content and return its address.
    async fn write(&self, content: Bytes) -> CasResult<ContentHash>;

    /// Read content by address, refusing anything larger than `max_size`.
    async fn read(&self, hash: &ContentHash, max_size: u64) -> CasResult<Bytes>;
}
