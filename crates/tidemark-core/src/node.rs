//! Wiring of a complete Tidemark node.

use std::sync::Arc;

use tidemark_cas::CasClient;
use tidemark_chain::BlockchainClient;
use tidemark_protocol::{ProtocolContext, VersionManager};
use tidemark_store::{
    InMemoryOperationQueue, InMemoryOperationStore, InMemoryTransactionStore,
    InMemoryWatermarkStore, OperationQueue, OperationStore, TransactionStore, WatermarkStore,
};
use tidemark_types::DidSuffix;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::{CoreResult, ResolutionError};
use crate::health::{HealthMonitor, HealthStatus};
use crate::observer::Observer;
use crate::resolver::{ResolvedDid, Resolver};
use crate::retry::RetryPolicy;
use crate::scheduler::BatchScheduler;

/// The storage backends a node runs on.
#[derive(Clone)]
pub struct NodeStores {
    pub operation_store: Arc<dyn OperationStore>,
    pub transaction_store: Arc<dyn TransactionStore>,
    pub watermark_store: Arc<dyn WatermarkStore>,
    pub queue: Arc<dyn OperationQueue>,
}

impl NodeStores {
    /// Fresh in-memory stores. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            operation_store: Arc::new(InMemoryOperationStore::new()),
            transaction_store: Arc::new(InMemoryTransactionStore::new()),
            watermark_store: Arc::new(InMemoryWatermarkStore::new()),
            queue: Arc::new(InMemoryOperationQueue::new()),
        }
    }
}

/// A batch scheduler, observer and resolver sharing one version schedule.
pub struct Node {
    config: NodeConfig,
    chain: Arc<dyn BlockchainClient>,
    versions: Arc<VersionManager>,
    retry: RetryPolicy,
    scheduler: BatchScheduler,
    observer: Observer,
    resolver: Resolver,
    health: Arc<HealthMonitor>,
}

impl Node {
    /// Validate `config` and build every component. Configuration problems
    /// are reported here, before anything runs.
    pub fn new(
        config: NodeConfig,
        chain: Arc<dyn BlockchainClient>,
        cas: Arc<dyn CasClient>,
        stores: NodeStores,
    ) -> CoreResult<Self> {
        config.validate()?;

        let context = ProtocolContext {
            chain: chain.clone(),
            cas,
            operation_store: stores.operation_store.clone(),
            queue: stores.queue.clone(),
        };
        let versions = Arc::new(VersionManager::new(&config.protocol_versions, &context)?);
        let retry = RetryPolicy::new(&config.retry, config.observer.call_timeout());
        let health = Arc::new(HealthMonitor::new());

        let scheduler = BatchScheduler::new(chain.clone(), versions.clone(), &config.scheduler);
        let observer = Observer::new(
            chain.clone(),
            versions.clone(),
            &stores,
            &config.observer,
            retry.clone(),
            health.clone(),
        );
        let resolver = Resolver::new(stores.operation_store.clone(), versions.clone());

        info!(schedule = ?versions.schedule(), "node initialized");
        Ok(Self {
            config,
            chain,
            versions,
            retry,
            scheduler,
            observer,
            resolver,
            health,
        })
    }

    /// Validate an operation request with the protocol version in force now
    /// and queue it for the next batch.
    pub async fn submit_operation(&self, request: &[u8]) -> CoreResult<DidSuffix> {
        let chain = &self.chain;
        let now = self
            .retry
            .run("approximate time", move || chain.approximate_time())
            .await?;
        let bundle = self.versions.version_for(now.time)?;
        let did = bundle.request_handler().handle(request)?;
        debug!(did = %did, version = %bundle.version().as_str(), "operation queued");
        Ok(did)
    }

    pub fn resolve(&self, did: &DidSuffix) -> Result<ResolvedDid, ResolutionError> {
        self.resolver.resolve(did)
    }

    /// Start the observer and the batch scheduler.
    pub fn start(&self) {
        self.observer.start();
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.scheduler.stop();
        self.observer.stop();
    }

    /// Stop both loops and wait for their current iteration to finish.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.observer.shutdown().await;
        info!("node stopped");
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn versions(&self) -> &Arc<VersionManager> {
        &self.versions
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn health(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }
}
