//! Node orchestration for Tidemark.
//!
//! A [`Node`] ties the protocol layer to a ledger, a CAS and a set of stores:
//!
//! - [`BatchScheduler`] periodically drains the operation queue into anchored batches
//! - [`Observer`] ingests anchored batches and survives ledger forks
//! - [`Resolver`] replays stored operations into DID state
//! - [`HealthMonitor`] reports whether ingestion is keeping up
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tidemark_cas::InMemoryCas;
//! use tidemark_chain::InMemoryBlockchain;
//! use tidemark_core::{Node, NodeConfig, NodeStores};
//! use tidemark_crypto::SigningKey;
//! use tidemark_protocol::{OperationRequest, Patch};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = Arc::new(InMemoryBlockchain::default());
//! let node = Node::new(
//!     NodeConfig::default(),
//!     chain.clone(),
//!     Arc::new(InMemoryCas::new()),
//!     NodeStores::in_memory(),
//! )?;
//!
//! let recovery = SigningKey::generate();
//! let update = SigningKey::generate();
//! let create = OperationRequest::create(&recovery.verifying_key(), &update.verifying_key(), Patch::new())?;
//! let did = node.submit_operation(&create.to_bytes()?).await?;
//!
//! node.scheduler().write_once().await;
//! chain.mine_block();
//! node.observer().poll_once().await?;
//!
//! let resolved = node.resolve(&did)?;
//! assert_eq!(resolved.applied.len(), 1);
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(demo()).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod node;
pub mod observer;
pub mod resolver;
pub mod retry;
pub mod scheduler;
mod task;

pub use config::{NodeConfig, ObserverConfig, RetryConfig, SchedulerConfig};
pub use error::{CoreError, CoreResult, ResolutionError};
pub use health::{HealthMonitor, HealthStatus};
pub use node::{Node, NodeStores};
pub use observer::{ForkRecovery, Observer, PollSummary};
pub use resolver::{RejectedOperation, ResolvedDid, Resolver};
pub use retry::RetryPolicy;
pub use scheduler::{BatchScheduler, WriteCycle};
