use tidemark_types::ContentHash;

/// Errors from content-addressable storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CasError {
    /// No content is stored under the hash (yet).
    #[error("content not found: {0}")]
    NotFound(ContentHash),

    /// The content exceeds the size the caller is willing to read.
    #[error("content {hash} is {size} bytes, exceeding the {max} byte limit")]
    TooLarge {
        hash: ContentHash,
        size: u64,
        max: u64,
    },

    /// The hash resolves to something that is not a plain file (e.g. a directory).
    #[error("content {0} is not a file")]
    NotAFile(ContentHash),

    /// The storage backend could not be reached.
    #[error("CAS unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding in-memory content was poisoned by a panicking writer.
    #[error("CAS lock poisoned: {0}")]
    Poisoned(String),
}

impl CasError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for CAS operations.
pub type CasResult<T> = Result<T, CasError>;
