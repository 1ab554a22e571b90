use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidemark_types::{BlockchainTime, Transaction, Watermark};

use crate::error::ChainResult;

/// One page of transactions returned by [`BlockchainClient::read`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    /// `true` if more transactions follow the returned page.
    pub more_transactions: bool,
    /// Transactions in strictly increasing `transaction_number` order.
    pub transactions: Vec<Transaction>,
}

/// Name and version reported by a blockchain service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVersion {
    pub name: String,
    pub version: String,
}

/// Client for the ledger that anchors batches.
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Write an anchor string, paying `fee`.
    ///
    /// Fails with `InsufficientFunds` or `PayloadTooLarge`.
    async fn write(&self, anchor_string: &str, fee: u64) -> ChainResult<()>;

    /// Read transactions after `since`, or from genesis when `since` is `None`.
    ///
    /// Fails with [`ChainError::InvalidTransactionHash`] when the transaction
    /// named by `since` is no longer on the canonical chain with that hash.
    ///
    /// [`ChainError::InvalidTransactionHash`]: crate::ChainError::InvalidTransactionHash
    async fn read(&self, since: Option<&Watermark>) -> ChainResult<ReadResult>;

    /// Return the highest-numbered candidate that is still on the canonical
    /// chain, or `None` if none of them are.
    async fn first_valid_transaction(
        &self,
        candidates: &[Transaction],
    ) -> ChainResult<Option<Transaction>>;

    /// The latest known ledger time.
    async fn approximate_time(&self) -> ChainResult<BlockchainTime>;

    /// Normalized per-operation fee in force at `time`.
    async fn fee(&self, time: u64) -> ChainResult<u64>;

    async fn version(&self) -> ChainResult<ServiceVersion>;
}
