use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tidemark_cas::{CasClient, CasError};
use tidemark_chain::BlockchainClient;
use tidemark_store::OperationStore;
use tidemark_types::{AnchoredOperation, Transaction};
use tracing::debug;

use crate::anchor::AnchorString;
use crate::error::{ProtocolError, Result};
use crate::operation::OperationRequest;
use crate::traits::TransactionProcessor;
use crate::version::ProtocolParameters;

/// Resolves an anchor to its batch, validates it, and stores its operations.
pub struct DefaultTransactionProcessor {
    parameters: ProtocolParameters,
    cas: Arc<dyn CasClient>,
    chain: Arc<dyn BlockchainClient>,
    operation_store: Arc<dyn OperationStore>,
}

impl DefaultTransactionProcessor {
    pub fn new(
        parameters: ProtocolParameters,
        cas: Arc<dyn CasClient>,
        chain: Arc<dyn BlockchainClient>,
        operation_store: Arc<dyn OperationStore>,
    ) -> Self {
        Self {
            parameters,
            cas,
            chain,
            operation_store,
        }
    }

    /// Decode and validate batch content into anchored operations.
    fn unpack(
        &self,
        transaction: &Transaction,
        anchor: &AnchorString,
        content: &[u8],
    ) -> Result<Vec<AnchoredOperation>> {
        let batch = self
            .parameters
            .codec
            .decode(content, self.parameters.max_batch_bytes)?;
        if batch.len() != anchor.operation_count {
            return Err(ProtocolError::malformed(format!(
                "anchor declares {} operations, batch holds {}",
                anchor.operation_count,
                batch.len()
            )));
        }

        let mut seen = HashSet::with_capacity(batch.len());
        let mut operations = Vec::with_capacity(batch.len());
        for (index, value) in batch.operations.into_iter().enumerate() {
            let buffer = serde_json::to_vec(&value)
                .map_err(|e| ProtocolError::malformed(format!("operation {index}: {e}")))?;
            if buffer.len() > self.parameters.max_operation_bytes {
                return Err(ProtocolError::malformed(format!(
                    "operation {index} is {} bytes, limit is {}",
                    buffer.len(),
                    self.parameters.max_operation_bytes
                )));
            }

            let request = OperationRequest::from_value(value)
                .map_err(|e| ProtocolError::malformed(format!("operation {index}: {e}")))?;
            let did_suffix = request
                .did_suffix()
                .map_err(|e| ProtocolError::malformed(format!("operation {index}: {e}")))?;
            if !seen.insert(did_suffix.clone()) {
                return Err(ProtocolError::malformed(format!(
                    "batch holds more than one operation for {did_suffix}"
                )));
            }

            operations.push(AnchoredOperation::new(
                transaction,
                index as u32,
                did_suffix,
                request.operation_type(),
                buffer,
            ));
        }
        Ok(operations)
    }
}

#[async_trait]
impl TransactionProcessor for DefaultTransactionProcessor {
    async fn process(&self, transaction: &Transaction) -> Result<usize> {
        let anchor = AnchorString::parse_with_limit(
            &transaction.anchor_string,
            self.parameters.max_operations_per_batch,
        )?;

        let normalized_fee = self.chain.fee(transaction.transaction_time).await?;
        let required = self
            .parameters
            .required_fee(normalized_fee, anchor.operation_count);
        if transaction.fee_paid < required {
            return Err(ProtocolError::malformed(format!(
                "fee {} is below the required {required}",
                transaction.fee_paid
            )));
        }

        let content = match self
            .cas
            .read(&anchor.content_hash, self.parameters.max_batch_bytes)
            .await
        {
            Ok(content) => content,
            Err(CasError::NotFound(hash)) => return Err(ProtocolError::ContentUnavailable(hash)),
            Err(e @ (CasError::TooLarge { .. } | CasError::NotAFile(_))) => {
                return Err(ProtocolError::malformed(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let operations = self.unpack(transaction, &anchor, &content)?;
        let inserted = self.operation_store.insert_batch(&operations)?;
        debug!(
            transaction_number = transaction.transaction_number,
            operations = operations.len(),
            inserted,
            "batch ingested"
        );
        Ok(inserted)
    }
}
