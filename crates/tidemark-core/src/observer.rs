//! Ledger ingestion with fork recovery.
//!
//! The observer walks the ledger from its persisted watermark, hands every
//! transaction to the transaction processor of the protocol version in force
//! at that transaction's time, and advances the watermark one transaction at
//! a time. When the ledger reports that the watermark's block is no longer
//! canonical, the observer searches back through the transactions it has
//! processed for the newest one that survived, drops everything stored after
//! it, and resumes from there.

use std::sync::Arc;

use chrono::Utc;
use tidemark_chain::BlockchainClient;
use tidemark_protocol::{ProtocolError, VersionManager};
use tidemark_store::{OperationStore, TransactionStore, UnresolvableTransaction, WatermarkStore};
use tidemark_types::{Transaction, Watermark};
use tracing::{debug, error, info, warn};

use crate::config::ObserverConfig;
use crate::error::{CoreError, CoreResult};
use crate::health::HealthMonitor;
use crate::node::NodeStores;
use crate::retry::RetryPolicy;
use crate::task::LoopControl;

/// Unresolvable records retried per poll.
const UNRESOLVABLE_RETRIES_PER_POLL: usize = 50;

/// What one poll did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub transactions_processed: usize,
    pub operations_stored: usize,
    pub malformed_skipped: usize,
    pub unresolvable_recorded: usize,
    pub unresolvable_resolved: usize,
    pub forks_recovered: usize,
}

/// The transaction a fork recovery rewound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkRecovery {
    /// `None` when ingestion restarts from genesis.
    pub anchor: Option<Transaction>,
    pub operations_removed: usize,
}

enum Ingested {
    Stored(usize),
    Malformed,
    Unavailable,
}

struct ObserverInner {
    chain: Arc<dyn BlockchainClient>,
    versions: Arc<VersionManager>,
    operation_store: Arc<dyn OperationStore>,
    transaction_store: Arc<dyn TransactionStore>,
    watermark_store: Arc<dyn WatermarkStore>,
    config: ObserverConfig,
    retry: RetryPolicy,
    health: Arc<HealthMonitor>,
    control: LoopControl,
}

/// Long-lived ingestion loop. Cheap to share; clones are not provided, wrap
/// it in an `Arc` instead.
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    pub fn new(
        chain: Arc<dyn BlockchainClient>,
        versions: Arc<VersionManager>,
        stores: &NodeStores,
        config: &ObserverConfig,
        retry: RetryPolicy,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                chain,
                versions,
                operation_store: stores.operation_store.clone(),
                transaction_store: stores.transaction_store.clone(),
                watermark_store: stores.watermark_store.clone(),
                config: config.clone(),
                retry,
                health,
                control: LoopControl::new(),
            }),
        }
    }

    /// Begin polling, starting immediately. A no-op if already running.
    pub fn start(&self) {
        let inner = self.inner.clone();
        if self.inner.control.start(async move { inner.run().await }) {
            info!(poll_interval = ?self.inner.config.poll_interval(), "observer started");
        }
    }

    /// Finish the current poll and stop.
    pub fn stop(&self) {
        self.inner.control.stop();
    }

    /// Stop and wait for the current poll to finish.
    pub async fn shutdown(&self) {
        self.inner.control.shutdown().await;
    }

    /// Poll now instead of waiting out the interval.
    pub fn wake(&self) {
        self.inner.control.wake();
    }

    pub fn is_running(&self) -> bool {
        self.inner.control.is_running()
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.inner.health
    }

    /// Ingest everything the ledger has past the watermark, updating health.
    pub async fn poll_once(&self) -> CoreResult<PollSummary> {
        self.inner.poll_once().await
    }

    /// Rewind to the newest processed transaction that is still canonical.
    pub async fn recover_from_fork(&self) -> CoreResult<ForkRecovery> {
        self.inner.recover_from_fork().await
    }
}

impl ObserverInner {
    async fn run(self: Arc<Self>) {
        loop {
            if let Err(CoreError::UnrecoverableFork { .. }) = self.poll_once().await {
                // Needs an operator; polling again would only repeat the search.
                self.control.stop();
            }
            self.control.pause(self.config.poll_interval()).await;
            if self.control.should_exit() {
                debug!("observer stopped");
                return;
            }
        }
    }

    async fn poll_once(&self) -> CoreResult<PollSummary> {
        let result = self.poll().await;
        match &result {
            Ok(summary) => {
                if summary.transactions_processed > 0 || summary.forks_recovered > 0 {
                    info!(
                        transactions = summary.transactions_processed,
                        operations = summary.operations_stored,
                        malformed = summary.malformed_skipped,
                        unresolvable = summary.unresolvable_recorded,
                        forks = summary.forks_recovered,
                        "poll complete"
                    );
                }
                self.health.mark_healthy();
            }
            Err(e @ CoreError::UnrecoverableFork { .. }) => {
                error!(error = %e, "observer halted");
                self.health.mark_failed(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "poll failed, will resume on the next poll");
                self.health.mark_degraded(e.to_string());
            }
        }
        result
    }

    async fn poll(&self) -> CoreResult<PollSummary> {
        let mut summary = PollSummary::default();
        self.retry_unresolvable(&mut summary).await?;

        loop {
            let watermark = self.watermark_store.load()?;
            let chain = &self.chain;
            let since = watermark.as_ref();
            let page = match self.retry.run("read transactions", move || chain.read(since)).await {
                Ok(page) => page,
                Err(e) if e.is_fork() => {
                    warn!(watermark = ?watermark, "watermark is no longer canonical");
                    self.recover_from_fork().await?;
                    summary.forks_recovered += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            for transaction in &page.transactions {
                match self.ingest(transaction).await? {
                    Ingested::Stored(count) => summary.operations_stored += count,
                    Ingested::Malformed => summary.malformed_skipped += 1,
                    Ingested::Unavailable => {
                        if self.record_unavailable(transaction, None)? {
                            summary.unresolvable_recorded += 1;
                        }
                    }
                }
                self.transaction_store.add_processed(transaction)?;
                self.watermark_store.save(&Watermark::from(transaction))?;
                summary.transactions_processed += 1;
            }

            if !page.more_transactions {
                return Ok(summary);
            }
        }
    }

    /// Process one transaction. Infrastructure errors are returned; problems
    /// with the transaction itself are reported as an outcome.
    async fn ingest(&self, transaction: &Transaction) -> CoreResult<Ingested> {
        let number = transaction.transaction_number;
        let bundle = match self.versions.version_for(transaction.transaction_time) {
            Ok(bundle) => bundle,
            Err(ProtocolError::Configuration(reason)) => {
                warn!(transaction = number, %reason, "no protocol version covers transaction, skipped");
                return Ok(Ingested::Malformed);
            }
            Err(e) => return Err(e.into()),
        };
        let processor = bundle.transaction_processor();

        match self
            .retry
            .run("process transaction", move || processor.process(transaction))
            .await
        {
            Ok(count) => {
                debug!(transaction = number, operations = count, "transaction processed");
                Ok(Ingested::Stored(count))
            }
            Err(CoreError::Protocol(ProtocolError::MalformedData(reason))) => {
                warn!(transaction = number, anchor = %transaction.anchor_string, %reason, "malformed batch skipped");
                Ok(Ingested::Malformed)
            }
            Err(CoreError::Protocol(ProtocolError::ContentUnavailable(hash))) => {
                warn!(transaction = number, content = %hash.short_hex(), "batch content unavailable, will retry");
                Ok(Ingested::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    /// Record or update an unresolvable transaction. `previous` is the
    /// existing record when this was a retry. Returns `false` once the
    /// attempt budget is spent and the transaction is given up on.
    fn record_unavailable(
        &self,
        transaction: &Transaction,
        previous: Option<&UnresolvableTransaction>,
    ) -> CoreResult<bool> {
        let now = Utc::now();
        let attempts = previous.map_or(1, |r| r.attempts.saturating_add(1));
        if attempts >= self.config.unresolvable_max_attempts {
            warn!(
                transaction = transaction.transaction_number,
                attempts, "batch content never became available, giving up"
            );
            if previous.is_some() {
                self.transaction_store
                    .remove_unresolvable(transaction.transaction_number)?;
            }
            return Ok(false);
        }

        let record = UnresolvableTransaction {
            transaction: transaction.clone(),
            attempts,
            first_failed_at: previous.map_or(now, |r| r.first_failed_at),
            next_retry_at: now + self.unresolvable_delay(attempts),
        };
        self.transaction_store.upsert_unresolvable(&record)?;
        Ok(true)
    }

    fn unresolvable_delay(&self, attempts: u32) -> chrono::Duration {
        let factor = 1u64 << attempts.saturating_sub(1).min(20);
        let secs = self
            .config
            .unresolvable_retry_base_secs
            .saturating_mul(factor)
            .min(u64::from(u32::MAX));
        chrono::Duration::seconds(secs as i64)
    }

    async fn retry_unresolvable(&self, summary: &mut PollSummary) -> CoreResult<()> {
        let due = self
            .transaction_store
            .unresolvable_due(Utc::now(), UNRESOLVABLE_RETRIES_PER_POLL)?;

        for record in due {
            let transaction = &record.transaction;
            match self.ingest(transaction).await? {
                Ingested::Stored(count) => {
                    info!(
                        transaction = transaction.transaction_number,
                        operations = count,
                        attempts = record.attempts,
                        "unresolvable transaction resolved"
                    );
                    self.transaction_store
                        .remove_unresolvable(transaction.transaction_number)?;
                    summary.operations_stored += count;
                    summary.unresolvable_resolved += 1;
                }
                Ingested::Malformed => {
                    self.transaction_store
                        .remove_unresolvable(transaction.transaction_number)?;
                    summary.malformed_skipped += 1;
                }
                Ingested::Unavailable => {
                    self.record_unavailable(transaction, Some(&record))?;
                }
            }
        }
        Ok(())
    }

    async fn recover_from_fork(&self) -> CoreResult<ForkRecovery> {
        let anchor = self.find_fork_anchor().await?;
        let number = anchor.as_ref().map(|t| t.transaction_number);

        let operations_removed = self.operation_store.delete_later_than(number)?;
        let transactions_removed = self.transaction_store.remove_processed_later_than(number)?;
        self.transaction_store.remove_unresolvable_later_than(number)?;
        match &anchor {
            Some(transaction) => self.watermark_store.save(&Watermark::from(transaction))?,
            None => self.watermark_store.clear()?,
        }

        warn!(
            anchor = ?number,
            operations_removed,
            transactions_removed,
            "recovered from fork"
        );
        Ok(ForkRecovery {
            anchor,
            operations_removed,
        })
    }

    /// Newest processed transaction still on the canonical chain, or `None`
    /// to restart from genesis.
    ///
    /// The first round checks the `fork_initial_window` most recent
    /// transactions one by one. Each later round covers twice as many older
    /// transactions, sampled at exponentially growing offsets plus the
    /// oldest one. Validity is monotonic in transaction number, so a sampled
    /// hit is a safe, possibly slightly older, anchor.
    async fn find_fork_anchor(&self) -> CoreResult<Option<Transaction>> {
        let mut skip = 0u64;
        let mut window = self.config.fork_initial_window.max(1);
        let mut dense = true;

        loop {
            let take = match self.config.max_fork_depth {
                Some(max) if skip >= max => {
                    return Err(CoreError::UnrecoverableFork { depth: max });
                }
                Some(max) => window.min(max - skip),
                None => window,
            };

            let recent = self.transaction_store.recent_processed(skip, take)?;
            if recent.is_empty() {
                return Ok(None);
            }
            let candidates = if dense {
                recent.clone()
            } else {
                sample_window(&recent)
            };

            let chain = &self.chain;
            let candidates = &candidates;
            let found = self
                .retry
                .run("find fork anchor", move || chain.first_valid_transaction(candidates))
                .await?;
            if found.is_some() {
                return Ok(found);
            }

            debug!(skip, checked = candidates.len(), "no fork anchor in window");
            skip += recent.len() as u64;
            window = window.saturating_mul(2);
            dense = false;
        }
    }
}

/// Entries at offsets 0, 1, 3, 7, ... of a descending window, plus the
/// oldest entry.
fn sample_window(window: &[Transaction]) -> Vec<Transaction> {
    let mut picked = Vec::new();
    let mut offset = 1usize;
    while offset <= window.len() {
        picked.push(window[offset - 1].clone());
        offset *= 2;
    }
    if let Some(last) = window.last() {
        if picked.last() != Some(last) {
            picked.push(last.clone());
        }
    }
    picked
}
