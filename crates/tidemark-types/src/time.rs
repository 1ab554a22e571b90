use std::fmt;

use serde::{Deserialize, Serialize};

/// A point on the ledger: a monotonic logical time and the hash of the block
/// observed at that time.
///
/// Two `BlockchainTime` values describe the same ledger state only when both
/// fields match; after a reorg the same `time` may carry a different `hash`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockchainTime {
    /// Monotonic logical counter (block height on most ledgers).
    pub time: u64,
    /// Fork-disambiguating opaque identifier.
    pub hash: String,
}

impl BlockchainTime {
    pub fn new(time: u64, hash: impl Into<String>) -> Self {
        Self {
            time,
            hash: hash.into(),
        }
    }

    /// Returns `true` if `other` names the same time on a different fork.
    pub fn is_forked_from(&self, other: &Self) -> bool {
        self.time == other.time && self.hash != other.hash
    }
}

impl fmt::Debug for BlockchainTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockchainTime({}@{})", self.time, short(&self.hash))
    }
}

impl fmt::Display for BlockchainTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.time, short(&self.hash))
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_both_fields() {
        let a = BlockchainTime::new(10, "aaaa");
        let b = BlockchainTime::new(10, "bbbb");
        assert_ne!(a, b);
        assert!(a.is_forked_from(&b));
        assert_eq!(a, BlockchainTime::new(10, "aaaa"));
    }

    #[test]
    fn different_times_are_not_forks() {
        let a = BlockchainTime::new(10, "aaaa");
        let b = BlockchainTime::new(11, "bbbb");
        assert!(!a.is_forked_from(&b));
    }

    #[test]
    fn display_truncates_hash() {
        let t = BlockchainTime::new(42, "0123456789abcdef");
        assert_eq!(format!("{t}"), "42@01234567");
    }
}
