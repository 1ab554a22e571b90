use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tidemark_types::ContentHash;
use tracing::debug;

use crate::error::{CasError, CasResult};
use crate::traits::CasClient;

fn poisoned<T>(e: PoisonError<T>) -> CasError {
    CasError::Poisoned(e.to_string())
}

#[derive(Clone)]
enum Entry {
    File(Bytes),
    Directory,
}

/// In-memory, HashMap-based content store.
///
/// Intended for tests, the demo node and embedding. Besides plain content it
/// can hold directory entries (to exercise `NotAFile`) and can be switched
/// offline to simulate transient outages.
pub struct InMemoryCas {
    entries: RwLock<HashMap<ContentHash, Entry>>,
    available: AtomicBool,
}

impl InMemoryCas {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Returns `true` if anything is stored under `hash`.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries().contains_key(hash)
    }

    /// Store content synchronously and return its hash.
    pub fn insert(&self, content: impl Into<Bytes>) -> ContentHash {
        let content = content.into();
        let hash = ContentHash::from_bytes(&content);
        self.entries_mut().entry(hash).or_insert(Entry::File(content));
        hash
    }

    /// Register a directory under `hash`; reads of it fail with `NotAFile`.
    pub fn insert_directory(&self, hash: ContentHash) {
        self.entries_mut().insert(hash, Entry::Directory);
    }

    /// Drop whatever is stored under `hash`. Returns `true` if it existed.
    pub fn remove(&self, hash: &ContentHash) -> bool {
        self.entries_mut().remove(hash).is_some()
    }

    /// Toggle availability; while unavailable every call fails with
    /// [`CasError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    // Test helpers keep working after a panicked writer; client calls report
    // the poisoning instead.
    fn entries(&self) -> RwLockReadGuard<'_, HashMap<ContentHash, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<ContentHash, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> CasResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CasError::Unavailable("in-memory CAS is offline".into()))
        }
    }
}

impl Default for InMemoryCas {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CasClient for InMemoryCas {
    async fn write(&self, content: Bytes) -> CasResult<ContentHash> {
        self.check_available()?;
        let size = content.len();
        let hash = ContentHash::from_bytes(&content);
        self.entries
            .write()
            .map_err(poisoned)?
            .entry(hash)
            .or_insert(Entry::File(content));
        debug!(hash = %hash.short_hex(), size, "CAS write");
        Ok(hash)
    }

    async fn read(&self, hash: &ContentHash, max_size: u64) -> CasResult<Bytes> {
        self.check_available()?;
        let entry = self
            .entries
            .read()
            .map_err(poisoned)?
            .get(hash)
            .cloned()
            .ok_or(CasError::NotFound(*hash))?;

        match entry {
            Entry::Directory => Err(CasError::NotAFile(*hash)),
            Entry::File(content) => {
                let size = content.len() as u64;
                if size > max_size {
                    return Err(CasError::TooLarge {
                        hash: *hash,
                        size,
                        max: max_size,
                    });
                }
                Ok(content)
            }
        }
    }
}

impl std::fmt::Debug for InMemoryCas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCas")
            .field("entry_count", &self.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}
