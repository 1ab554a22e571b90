use serde::{Deserialize, Serialize};

use crate::transaction::{Transaction, TransactionNumber};

/// Durable marker of the last transaction the observer finished ingesting.
///
/// The pair is handed back to the ledger on the next read so it can detect
/// whether the transaction at `last_processed_transaction_number` still has
/// the same block hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_processed_transaction_number: TransactionNumber,
    pub last_processed_transaction_time_hash: String,
}

impl Watermark {
    pub fn new(number: TransactionNumber, time_hash: impl Into<String>) -> Self {
        Self {
            last_processed_transaction_number: number,
            last_processed_transaction_time_hash: time_hash.into(),
        }
    }
}

impl From<&Transaction> for Watermark {
    fn from(transaction: &Transaction) -> Self {
        Self::new(
            transaction.transaction_number,
            transaction.transaction_time_hash.clone(),
        )
    }
}
