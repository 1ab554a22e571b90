use std::sync::Arc;

use tidemark_cas::CasClient;
use tidemark_chain::BlockchainClient;
use tidemark_store::{OperationQueue, OperationStore};

use crate::handler::DefaultRequestHandler;
use crate::ingest::DefaultTransactionProcessor;
use crate::processor::DefaultOperationProcessor;
use crate::traits::{BatchWriter, OperationProcessor, RequestHandler, TransactionProcessor};
use crate::version::{ProtocolParameters, ProtocolVersionId};
use crate::writer::DefaultBatchWriter;

/// The collaborators every protocol bundle is built against.
#[derive(Clone)]
pub struct ProtocolContext {
    pub chain: Arc<dyn BlockchainClient>,
    pub cas: Arc<dyn CasClient>,
    pub operation_store: Arc<dyn OperationStore>,
    pub queue: Arc<dyn OperationQueue>,
}

/// The behavior of one protocol version, behind its four capabilities.
pub struct ProtocolBundle {
    version: ProtocolVersionId,
    parameters: ProtocolParameters,
    batch_writer: Arc<dyn BatchWriter>,
    transaction_processor: Arc<dyn TransactionProcessor>,
    operation_processor: Arc<dyn OperationProcessor>,
    request_handler: Arc<dyn RequestHandler>,
}

impl ProtocolBundle {
    pub fn build(version: ProtocolVersionId, context: &ProtocolContext) -> Self {
        let parameters = version.parameters();
        Self {
            version,
            parameters,
            batch_writer: Arc::new(DefaultBatchWriter::new(
                parameters,
                context.queue.clone(),
                context.cas.clone(),
                context.chain.clone(),
            )),
            transaction_processor: Arc::new(DefaultTransactionProcessor::new(
                parameters,
                context.cas.clone(),
                context.chain.clone(),
                context.operation_store.clone(),
            )),
            operation_processor: Arc::new(DefaultOperationProcessor::new(parameters)),
            request_handler: Arc::new(DefaultRequestHandler::new(
                parameters,
                context.queue.clone(),
            )),
        }
    }

    /// Replace the batch writer, e.g. with an instrumented one.
    pub fn with_batch_writer(mut self, batch_writer: Arc<dyn BatchWriter>) -> Self {
        self.batch_writer = batch_writer;
        self
    }

    pub fn version(&self) -> ProtocolVersionId {
        self.version
    }

    pub fn parameters(&self) -> &ProtocolParameters {
        &self.parameters
    }

    pub fn batch_writer(&self) -> &Arc<dyn BatchWriter> {
        &self.batch_writer
    }

    pub fn transaction_processor(&self) -> &Arc<dyn TransactionProcessor> {
        &self.transaction_processor
    }

    pub fn operation_processor(&self) -> &Arc<dyn OperationProcessor> {
        &self.operation_processor
    }

    pub fn request_handler(&self) -> &Arc<dyn RequestHandler> {
        &self.request_handler
    }
}

impl std::fmt::Debug for ProtocolBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolBundle")
            .field("version", &self.version)
            .field("parameters", &self.parameters)
            .finish()
    }
}
