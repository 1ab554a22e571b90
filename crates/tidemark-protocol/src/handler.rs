use std::sync::Arc;

use tidemark_store::{OperationQueue, QueuedOperation};
use tidemark_types::DidSuffix;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::operation::OperationRequest;
use crate::traits::RequestHandler;
use crate::version::ProtocolParameters;

/// Validates operation requests and places them on the operation queue.
pub struct DefaultRequestHandler {
    parameters: ProtocolParameters,
    queue: Arc<dyn OperationQueue>,
}

impl DefaultRequestHandler {
    pub fn new(parameters: ProtocolParameters, queue: Arc<dyn OperationQueue>) -> Self {
        Self { parameters, queue }
    }
}

impl RequestHandler for DefaultRequestHandler {
    fn handle(&self, request: &[u8]) -> Result<DidSuffix> {
        if request.len() > self.parameters.max_operation_bytes {
            return Err(ProtocolError::malformed(format!(
                "request is {} bytes, limit is {}",
                request.len(),
                self.parameters.max_operation_bytes
            )));
        }
        let parsed =
            OperationRequest::parse(request).map_err(|e| ProtocolError::malformed(e.to_string()))?;
        let did_suffix = parsed
            .did_suffix()
            .map_err(|e| ProtocolError::malformed(e.to_string()))?;

        self.queue.enqueue(QueuedOperation {
            did_suffix: did_suffix.clone(),
            operation_type: parsed.operation_type(),
            operation_buffer: request.to_vec(),
        })?;

        debug!(did = %did_suffix, operation_type = %parsed.operation_type(), "operation queued");
        Ok(did_suffix)
    }
}
