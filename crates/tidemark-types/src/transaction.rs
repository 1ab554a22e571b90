use serde::{Deserialize, Serialize};

use crate::time::BlockchainTime;

/// Position of a transaction on the canonical chain.
pub type TransactionNumber = u64;

/// One anchor observed on the ledger.
///
/// Transaction numbers are strictly increasing along the canonical chain. A
/// transaction is immutable once finalized but may be invalidated by a reorg,
/// after which everything derived from it must be discarded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_number: TransactionNumber,
    pub transaction_time: u64,
    pub transaction_time_hash: String,
    /// Opaque batch pointer, interpreted by the protocol version in force at
    /// `transaction_time`.
    pub anchor_string: String,
    pub fee_paid: u64,
}

impl Transaction {
    /// The ledger time this transaction was included at.
    pub fn blockchain_time(&self) -> BlockchainTime {
        BlockchainTime::new(self.transaction_time, self.transaction_time_hash.clone())
    }

    /// Returns `true` if `other` describes the same ledger entry.
    pub fn is_same_entry(&self, other: &Self) -> bool {
        self.transaction_number == other.transaction_number
            && self.transaction_time_hash == other.transaction_time_hash
            && self.anchor_string == other.anchor_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(number: u64, hash: &str, anchor: &str) -> Transaction {
        Transaction {
            transaction_number: number,
            transaction_time: 5,
            transaction_time_hash: hash.into(),
            anchor_string: anchor.into(),
            fee_paid: 10,
        }
    }

    #[test]
    fn same_entry_ignores_fee() {
        let mut a = txn(1, "h", "1.abc");
        let b = txn(1, "h", "1.abc");
        a.fee_paid = 99;
        assert!(a.is_same_entry(&b));
    }

    #[test]
    fn different_hash_is_different_entry() {
        assert!(!txn(1, "h1", "1.abc").is_same_entry(&txn(1, "h2", "1.abc")));
    }

    #[test]
    fn blockchain_time_carries_hash() {
        let t = txn(3, "beef", "1.abc").blockchain_time();
        assert_eq!(t, BlockchainTime::new(5, "beef"));
    }
}
