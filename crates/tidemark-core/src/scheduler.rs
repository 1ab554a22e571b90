//! Periodic batch creation.

use std::sync::Arc;
use std::time::Duration;

use tidemark_chain::BlockchainClient;
use tidemark_protocol::{VersionManager, WrittenBatch};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::CoreResult;
use crate::task::LoopControl;

/// Outcome of one write attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteCycle {
    Written(WrittenBatch),
    /// Nothing was queued.
    Idle,
    /// The attempt failed; the error has been logged.
    Skipped,
}

struct SchedulerInner {
    chain: Arc<dyn BlockchainClient>,
    versions: Arc<VersionManager>,
    interval: Duration,
    write_timeout: Duration,
    control: LoopControl,
}

/// Drives the batch writer of the protocol version in force.
///
/// At most one write attempt runs at a time: the next attempt is scheduled
/// `batch_interval` after the previous one completes.
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl BatchScheduler {
    pub fn new(
        chain: Arc<dyn BlockchainClient>,
        versions: Arc<VersionManager>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                chain,
                versions,
                interval: config.batch_interval(),
                write_timeout: config.write_timeout(),
                control: LoopControl::new(),
            }),
        }
    }

    /// Begin writing batches, starting immediately. A no-op if already running.
    pub fn start(&self) {
        let inner = self.inner.clone();
        if self.inner.control.start(async move { inner.run().await }) {
            info!(interval = ?self.inner.interval, "batch scheduler started");
        }
    }

    /// Let the in-flight attempt finish and schedule no further ones.
    pub fn stop(&self) {
        self.inner.control.stop();
    }

    /// Stop and wait for the in-flight attempt to finish.
    pub async fn shutdown(&self) {
        self.inner.control.shutdown().await;
    }

    pub fn is_running(&self) -> bool {
        self.inner.control.is_running()
    }

    /// Run one write attempt. Never fails: errors are logged as a skipped
    /// cycle.
    pub async fn write_once(&self) -> WriteCycle {
        self.inner.write_once().await
    }
}

impl SchedulerInner {
    async fn run(self: Arc<Self>) {
        loop {
            self.write_once().await;
            self.control.pause(self.interval).await;
            if self.control.should_exit() {
                debug!("batch scheduler stopped");
                return;
            }
        }
    }

    async fn write_once(&self) -> WriteCycle {
        match tokio::time::timeout(self.write_timeout, self.try_write()).await {
            Ok(Ok(Some(batch))) => WriteCycle::Written(batch),
            Ok(Ok(None)) => WriteCycle::Idle,
            Ok(Err(e)) => {
                warn!(error = %e, "batch write failed, cycle skipped");
                WriteCycle::Skipped
            }
            Err(_) => {
                warn!(timeout = ?self.write_timeout, "batch write timed out, cycle skipped");
                WriteCycle::Skipped
            }
        }
    }

    async fn try_write(&self) -> CoreResult<Option<WrittenBatch>> {
        let now = self.chain.approximate_time().await?;
        let bundle = self.versions.version_for(now.time)?;
        Ok(bundle.batch_writer().write().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tidemark_cas::InMemoryCas;
    use tidemark_chain::InMemoryBlockchain;
    use tidemark_protocol::{
        BatchWriter, ProtocolBundle, ProtocolContext, ProtocolError, ProtocolVersionId,
    };
    use tidemark_store::{InMemoryOperationQueue, InMemoryOperationStore};
    use tokio::time::Instant;

    use super::*;

    /// A writer that takes a fixed time and records when each call started.
    struct SlowWriter {
        duration: Duration,
        fail: bool,
        starts: Mutex<Vec<Instant>>,
        completions: Mutex<u32>,
        in_flight: Mutex<(u32, u32)>,
    }

    impl SlowWriter {
        fn new(duration: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                duration,
                fail,
                starts: Mutex::new(Vec::new()),
                completions: Mutex::new(0),
                in_flight: Mutex::new((0, 0)),
            })
        }

        fn starts(&self) -> Vec<Instant> {
            self.starts.lock().unwrap().clone()
        }

        fn completions(&self) -> u32 {
            *self.completions.lock().unwrap()
        }

        /// Highest number of writes seen in flight at once.
        fn max_in_flight(&self) -> u32 {
            self.in_flight.lock().unwrap().1
        }
    }

    #[async_trait]
    impl BatchWriter for SlowWriter {
        async fn write(&self) -> tidemark_protocol::Result<Option<WrittenBatch>> {
            self.starts.lock().unwrap().push(Instant::now());
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                in_flight.0 += 1;
                in_flight.1 = in_flight.1.max(in_flight.0);
            }
            tokio::time::sleep(self.duration).await;
            self.in_flight.lock().unwrap().0 -= 1;
            *self.completions.lock().unwrap() += 1;
            if self.fail {
                return Err(ProtocolError::malformed("boom"));
            }
            Ok(None)
        }
    }

    fn scheduler(writer: Arc<SlowWriter>, interval_ms: u64) -> BatchScheduler {
        let chain = Arc::new(InMemoryBlockchain::default());
        let context = ProtocolContext {
            chain: chain.clone(),
            cas: Arc::new(InMemoryCas::new()),
            operation_store: Arc::new(InMemoryOperationStore::new()),
            queue: Arc::new(InMemoryOperationQueue::new()),
        };
        let bundle = ProtocolBundle::build(ProtocolVersionId::V1, &context).with_batch_writer(writer);
        let versions = VersionManager::from_bundles(vec![(0, Arc::new(bundle))]).unwrap();
        BatchScheduler::new(
            chain,
            Arc::new(versions),
            &SchedulerConfig {
                batch_interval_ms: interval_ms,
                write_timeout_ms: 60_000,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn next_write_starts_interval_after_completion() {
        let writer = SlowWriter::new(Duration::from_secs(3), false);
        let scheduler = scheduler(writer.clone(), 1_000);
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        scheduler.stop();

        let starts = writer.starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1] - starts[0], Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_runs_one_loop() {
        let writer = SlowWriter::new(Duration::from_secs(3), false);
        let scheduler = scheduler(writer.clone(), 1_000);
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(writer.starts().len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_write_finish() {
        let writer = SlowWriter::new(Duration::from_secs(3), false);
        let scheduler = scheduler(writer.clone(), 1_000);
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(writer.starts().len(), 1);
        assert_eq!(writer.completions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_during_shutdown_never_overlaps_writes() {
        let writer = SlowWriter::new(Duration::from_secs(3), false);
        let scheduler = Arc::new(scheduler(writer.clone(), 1_000));
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopping = scheduler.clone();
        let shutdown = tokio::spawn(async move { stopping.shutdown().await });
        tokio::task::yield_now().await;
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(shutdown.is_finished());
        assert_eq!(writer.max_in_flight(), 1);
        assert!(writer.starts().windows(2).all(|w| w[1] - w[0] >= Duration::from_secs(4)));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_restart_mid_write_keeps_single_flight() {
        let writer = SlowWriter::new(Duration::from_secs(3), false);
        let scheduler = scheduler(writer.clone(), 1_000);
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler.stop();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(8_500)).await;
        assert_eq!(writer.max_in_flight(), 1);
        // Writes at 0s, 4s and 8s: the restart resumed the original loop.
        assert_eq!(writer.starts().len(), 3);
        scheduler.shutdown().await;
        assert_eq!(writer.completions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let writer = SlowWriter::new(Duration::from_millis(10), true);
        let scheduler = scheduler(writer.clone(), 1_000);
        assert_eq!(scheduler.write_once().await, WriteCycle::Skipped);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        scheduler.shutdown().await;
        // One manual attempt plus three scheduled ones at 0s, ~1s and ~2s.
        assert_eq!(writer.starts().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out_as_skipped() {
        let writer = SlowWriter::new(Duration::from_secs(120), false);
        let scheduler = scheduler(writer.clone(), 1_000);
        assert_eq!(scheduler.write_once().await, WriteCycle::Skipped);
        assert_eq!(writer.completions(), 0);
    }

    #[tokio::test]
    async fn idle_when_queue_empty() {
        let chain = Arc::new(InMemoryBlockchain::default());
        let context = ProtocolContext {
            chain: chain.clone(),
            cas: Arc::new(InMemoryCas::new()),
            operation_store: Arc::new(InMemoryOperationStore::new()),
            queue: Arc::new(InMemoryOperationQueue::new()),
        };
        let versions = VersionManager::new(
            &[tidemark_protocol::ProtocolVersionConfig::new(0, "v1")],
            &context,
        )
        .unwrap();
        let scheduler = BatchScheduler::new(chain, Arc::new(versions), &SchedulerConfig::default());
        assert_eq!(scheduler.write_once().await, WriteCycle::Idle);
    }
}
