use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tidemark_types::{BlockchainTime, Transaction, Watermark};
use tracing::{debug, info};

use crate::error::{ChainError, ChainResult};
use crate::traits::{BlockchainClient, ReadResult, ServiceVersion};

fn poisoned<T>(e: PoisonError<T>) -> ChainError {
    ChainError::Poisoned(e.to_string())
}

/// Tunables for [`InMemoryBlockchain`].
#[derive(Clone, Debug)]
pub struct ChainConfig {
    /// Maximum transactions returned by one `read`.
    pub page_size: usize,
    /// Maximum anchor string length in bytes.
    pub max_anchor_bytes: usize,
    /// Normalized fee reported for every time without an override.
    pub normalized_fee: u64,
    /// Funds available to the writer.
    pub initial_balance: u64,
    /// Time of the genesis block.
    pub genesis_time: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_anchor_bytes: 256,
            normalized_fee: 1,
            initial_balance: 1_000_000,
            genesis_time: 0,
        }
    }
}

#[derive(Clone, Debug)]
struct Block {
    time: u64,
    hash: String,
    transactions: Vec<Transaction>,
}

struct ChainState {
    blocks: Vec<Block>,
    pending: Vec<(String, u64)>,
    balance: u64,
    fork_epoch: u64,
    fee_overrides: BTreeMap<u64, u64>,
}

impl ChainState {
    fn tip(&self) -> &Block {
        // Genesis is never removed, so `blocks` is never empty.
        &self.blocks[self.blocks.len() - 1]
    }

    fn transaction_count(&self) -> u64 {
        self.blocks.iter().map(|b| b.transactions.len() as u64).sum()
    }

    fn find(&self, number: u64) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|t| t.transaction_number == number)
    }

    fn push_block(&mut self, anchors: Vec<(String, u64)>) -> Vec<Transaction> {
        let parent = self.tip().hash.clone();
        let time = self.tip().time + 1;
        let hash = block_hash(&parent, time, self.fork_epoch, &anchors);
        let first_number = self.transaction_count();

        let transactions: Vec<Transaction> = anchors
            .into_iter()
            .enumerate()
            .map(|(i, (anchor_string, fee_paid))| Transaction {
                transaction_number: first_number + i as u64,
                transaction_time: time,
                transaction_time_hash: hash.clone(),
                anchor_string,
                fee_paid,
            })
            .collect();

        self.blocks.push(Block {
            time,
            hash,
            transactions: transactions.clone(),
        });
        transactions
    }
}

fn block_hash(parent: &str, time: u64, epoch: u64, anchors: &[(String, u64)]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent.as_bytes());
    hasher.update(&time.to_le_bytes());
    hasher.update(&epoch.to_le_bytes());
    for (anchor, fee) in anchors {
        hasher.update(anchor.as_bytes());
        hasher.update(&fee.to_le_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Forkable in-memory ledger for tests, local demos, and embedding.
///
/// Anchors written through [`BlockchainClient::write`] wait in a pending pool
/// until [`mine_block`](Self::mine_block) seals them into a block. Transaction
/// numbers count every transaction on the canonical chain, so after a
/// [`reorg`](Self::reorg) the same number may name a different anchor.
pub struct InMemoryBlockchain {
    config: ChainConfig,
    inner: RwLock<ChainState>,
    available: AtomicBool,
}

impl InMemoryBlockchain {
    pub fn new(config: ChainConfig) -> Self {
        let genesis_time = config.genesis_time;
        let genesis = Block {
            time: genesis_time,
            hash: block_hash("", genesis_time, 0, &[]),
            transactions: Vec::new(),
        };
        Self {
            inner: RwLock::new(ChainState {
                blocks: vec![genesis],
                pending: Vec::new(),
                balance: config.initial_balance,
                fork_epoch: 0,
                fee_overrides: BTreeMap::new(),
            }),
            config,
            available: AtomicBool::new(true),
        }
    }

    /// Seal every pending anchor into a new block and return its time.
    pub fn mine_block(&self) -> BlockchainTime {
        let mut state = self.state_mut();
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        state.push_block(pending);
        let tip = state.tip();
        debug!(time = tip.time, transactions = count, "block mined");
        BlockchainTime::new(tip.time, tip.hash.clone())
    }

    /// Append a block holding exactly `anchors`, bypassing the pending pool
    /// and balance checks.
    pub fn append_block(&self, anchors: Vec<(String, u64)>) -> Vec<Transaction> {
        self.state_mut().push_block(anchors)
    }

    /// Append empty blocks until the tip reaches `time`.
    pub fn advance_to(&self, time: u64) {
        let mut state = self.state_mut();
        while state.tip().time < time {
            state.push_block(Vec::new());
        }
    }

    /// Replace every block at or after `from_time` with `replacement` blocks.
    ///
    /// Each inner vector becomes one block. The genesis block cannot be
    /// replaced; `from_time` at or below genesis is clamped to the block after it.
    pub fn reorg(&self, from_time: u64, replacement: Vec<Vec<(String, u64)>>) {
        let mut state = self.state_mut();
        let genesis_time = state.blocks[0].time;
        let cut = from_time.max(genesis_time + 1);
        state.blocks.retain(|b| b.time < cut);
        state.fork_epoch += 1;
        let blocks = replacement.len();
        for anchors in replacement {
            state.push_block(anchors);
        }
        info!(from_time = cut, blocks, epoch = state.fork_epoch, "chain reorganized");
    }

    /// Override the normalized fee for every time at or after `from_time`.
    pub fn set_fee_from(&self, from_time: u64, fee: u64) {
        self.state_mut().fee_overrides.insert(from_time, fee);
    }

    /// Toggle availability; while unavailable every call fails with
    /// [`ChainError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Every transaction on the canonical chain.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state()
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect()
    }

    /// Anchors waiting for the next block.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn balance(&self) -> u64 {
        self.state().balance
    }

    // Simulation helpers keep working after a panicked writer; trait calls
    // report the poisoning instead.
    fn state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> ChainResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChainError::Unavailable("in-memory ledger is offline".into()))
        }
    }
}

impl Default for InMemoryBlockchain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

#[async_trait]
impl BlockchainClient for InMemoryBlockchain {
    async fn write(&self, anchor_string: &str, fee: u64) -> ChainResult<()> {
        self.check_available()?;
        if anchor_string.len() > self.config.max_anchor_bytes {
            return Err(ChainError::PayloadTooLarge {
                size: anchor_string.len(),
                max: self.config.max_anchor_bytes,
            });
        }

        let mut state = self.inner.write().map_err(poisoned)?;
        if fee > state.balance {
            return Err(ChainError::InsufficientFunds {
                required: fee,
                available: state.balance,
            });
        }
        state.balance -= fee;
        state.pending.push((anchor_string.to_string(), fee));
        debug!(anchor = anchor_string, fee, "anchor queued");
        Ok(())
    }

    async fn read(&self, since: Option<&Watermark>) -> ChainResult<ReadResult> {
        self.check_available()?;
        let state = self.inner.read().map_err(poisoned)?;

        let after = match since {
            None => None,
            Some(mark) => {
                let number = mark.last_processed_transaction_number;
                match state.find(number) {
                    Some(t) if t.transaction_time_hash == mark.last_processed_transaction_time_hash => {
                        Some(number)
                    }
                    _ => {
                        return Err(ChainError::InvalidTransactionHash {
                            transaction_number: number,
                            transaction_time_hash: mark.last_processed_transaction_time_hash.clone(),
                        })
                    }
                }
            }
        };

        let mut remaining = state
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|t| after.map_or(true, |n| t.transaction_number > n));

        let transactions: Vec<Transaction> =
            remaining.by_ref().take(self.config.page_size).cloned().collect();
        let more_transactions = remaining.next().is_some();

        Ok(ReadResult {
            more_transactions,
            transactions,
        })
    }

    async fn first_valid_transaction(
        &self,
        candidates: &[Transaction],
    ) -> ChainResult<Option<Transaction>> {
        self.check_available()?;
        let state = self.inner.read().map_err(poisoned)?;
        let mut sorted: Vec<&Transaction> = candidates.iter().collect();
        sorted.sort_by(|a, b| b.transaction_number.cmp(&a.transaction_number));

        Ok(sorted
            .into_iter()
            .find(|candidate| {
                state
                    .find(candidate.transaction_number)
                    .is_some_and(|canonical| canonical.is_same_entry(candidate))
            })
            .cloned())
    }

    async fn approximate_time(&self) -> ChainResult<BlockchainTime> {
        self.check_available()?;
        let state = self.inner.read().map_err(poisoned)?;
        let tip = state.tip();
        Ok(BlockchainTime::new(tip.time, tip.hash.clone()))
    }

    async fn fee(&self, time: u64) -> ChainResult<u64> {
        self.check_available()?;
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state
            .fee_overrides
            .range(..=time)
            .next_back()
            .map_or(self.config.normalized_fee, |(_, fee)| *fee))
    }

    async fn version(&self) -> ChainResult<ServiceVersion> {
        Ok(ServiceVersion {
            name: "in-memory".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        })
    }
}

impl std::fmt::Debug for InMemoryBlockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryBlockchain")
            .field("height", &state.tip().time)
            .field("transactions", &state.transaction_count())
            .field("pending", &state.pending.len())
            .finish()
    }
}
