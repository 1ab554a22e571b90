use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tidemark_cas::CasClient;
use tidemark_chain::BlockchainClient;
use tidemark_store::OperationQueue;
use tracing::{debug, info};

use crate::anchor::AnchorString;
use crate::codec::OperationBatch;
use crate::error::{ProtocolError, Result};
use crate::traits::{BatchWriter, WrittenBatch};
use crate::version::ProtocolParameters;

/// Batches queued operations into CAS content and anchors the pointer on
/// the ledger.
pub struct DefaultBatchWriter {
    parameters: ProtocolParameters,
    queue: Arc<dyn OperationQueue>,
    cas: Arc<dyn CasClient>,
    chain: Arc<dyn BlockchainClient>,
}

impl DefaultBatchWriter {
    pub fn new(
        parameters: ProtocolParameters,
        queue: Arc<dyn OperationQueue>,
        cas: Arc<dyn CasClient>,
        chain: Arc<dyn BlockchainClient>,
    ) -> Self {
        Self {
            parameters,
            queue,
            cas,
            chain,
        }
    }
}

#[async_trait]
impl BatchWriter for DefaultBatchWriter {
    async fn write(&self) -> Result<Option<WrittenBatch>> {
        let pending = self.queue.peek(self.parameters.max_operations_per_batch)?;
        if pending.is_empty() {
            debug!("operation queue empty, nothing to anchor");
            return Ok(None);
        }

        let batch =
            OperationBatch::from_buffers(pending.iter().map(|q| q.operation_buffer.as_slice()))?;
        let content = self.parameters.codec.encode(&batch)?;
        if content.len() as u64 > self.parameters.max_batch_bytes {
            return Err(ProtocolError::malformed(format!(
                "encoded batch is {} bytes, limit is {}",
                content.len(),
                self.parameters.max_batch_bytes
            )));
        }

        // CAS writes are idempotent, so a retry after a failed ledger write
        // re-uploads the same content under the same hash.
        let content_hash = self.cas.write(Bytes::from(content)).await?;
        let anchor = AnchorString::new(batch.len(), content_hash);

        let now = self.chain.approximate_time().await?;
        let normalized_fee = self.chain.fee(now.time).await?;
        let fee = self.parameters.required_fee(normalized_fee, batch.len());

        let anchor_string = anchor.to_string();
        self.chain.write(&anchor_string, fee).await?;

        // Only now may the operations leave the queue.
        self.queue.dequeue(batch.len())?;

        info!(
            anchor = %anchor_string,
            operations = batch.len(),
            fee,
            "batch anchored"
        );
        Ok(Some(WrittenBatch {
            anchor_string,
            operation_count: batch.len(),
            fee,
        }))
    }
}

#[cfg(test)]
mod tests {
    use tidemark_cas::InMemoryCas;
    use tidemark_chain::{ChainConfig, ChainError, InMemoryBlockchain};
    use tidemark_store::{InMemoryOperationQueue, QueuedOperation};
    use tidemark_types::{DidSuffix, OperationType};

    use super::*;
    use crate::codec::BatchCodec;
    use crate::version::ProtocolVersionId;

    fn queued(i: usize) -> QueuedOperation {
        QueuedOperation {
            did_suffix: DidSuffix::parse(&format!("{i:064x}")).unwrap(),
            operation_type: OperationType::Create,
            operation_buffer: format!(r#"{{"type":"create","n":{i}}}"#).into_bytes(),
        }
    }

    struct Fixture {
        queue: Arc<InMemoryOperationQueue>,
        cas: Arc<InMemoryCas>,
        chain: Arc<InMemoryBlockchain>,
    }

    impl Fixture {
        fn new(chain_config: ChainConfig) -> Self {
            Self {
                queue: Arc::new(InMemoryOperationQueue::new()),
                cas: Arc::new(InMemoryCas::new()),
                chain: Arc::new(InMemoryBlockchain::new(chain_config)),
            }
        }

        fn writer(&self, version: ProtocolVersionId) -> DefaultBatchWriter {
            DefaultBatchWriter::new(
                version.parameters(),
                self.queue.clone(),
                self.cas.clone(),
                self.chain.clone(),
            )
        }
    }

    #[tokio::test]
    async fn empty_queue_writes_nothing() {
        let f = Fixture::new(ChainConfig::default());
        assert_eq!(f.writer(ProtocolVersionId::V1).write().await.unwrap(), None);
        assert_eq!(f.chain.pending_count(), 0);
        assert!(f.cas.is_empty());
    }

    #[tokio::test]
    async fn writes_at_most_one_batch_limit() {
        let f = Fixture::new(ChainConfig {
            normalized_fee: 3,
            ..ChainConfig::default()
        });
        for i in 0..150 {
            f.queue.enqueue(queued(i)).unwrap();
        }

        let written = f.writer(ProtocolVersionId::V1).write().await.unwrap().unwrap();
        assert_eq!(written.operation_count, 100);
        assert_eq!(written.fee, 300);
        assert!(written.anchor_string.starts_with("100."));
        assert_eq!(f.queue.len().unwrap(), 50);
        assert_eq!(f.chain.pending_count(), 1);

        let anchor: AnchorString = written.anchor_string.parse().unwrap();
        let content = f.cas.read(&anchor.content_hash, u64::MAX).await.unwrap();
        let batch = BatchCodec::Json.decode(&content, u64::MAX).unwrap();
        assert_eq!(batch.len(), 100);
        assert_eq!(batch.operations[0]["n"], 0);
    }

    #[tokio::test]
    async fn v2_writes_compressed_content() {
        let f = Fixture::new(ChainConfig::default());
        f.queue.enqueue(queued(1)).unwrap();
        let written = f.writer(ProtocolVersionId::V2).write().await.unwrap().unwrap();

        let anchor: AnchorString = written.anchor_string.parse().unwrap();
        let content = f.cas.read(&anchor.content_hash, u64::MAX).await.unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&content).is_err());
        assert_eq!(BatchCodec::ZstdJson.decode(&content, 1_000).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_ledger_write_keeps_operations_queued() {
        let f = Fixture::new(ChainConfig {
            initial_balance: 0,
            ..ChainConfig::default()
        });
        f.queue.enqueue(queued(7)).unwrap();

        let err = f.writer(ProtocolVersionId::V1).write().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Chain(ChainError::InsufficientFunds { .. })
        ));
        assert_eq!(f.queue.len().unwrap(), 1);
        // The CAS write already happened and is harmless to repeat.
        assert_eq!(f.cas.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_cas_is_transient() {
        let f = Fixture::new(ChainConfig::default());
        f.queue.enqueue(queued(7)).unwrap();
        f.cas.set_available(false);

        let err = f.writer(ProtocolVersionId::V1).write().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(f.queue.len().unwrap(), 1);
        assert_eq!(f.chain.pending_count(), 0);
    }
}
