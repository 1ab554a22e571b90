//! Batch content encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

const ZSTD_LEVEL: i32 = 3;

/// The content a batch anchor points at.
///
/// Operations are kept as raw JSON values: each one is parsed and
/// size-checked individually so one bad entry marks the whole batch
/// malformed rather than failing the decode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationBatch {
    pub operations: Vec<Value>,
}

impl OperationBatch {
    /// Build a batch from already-serialized operation requests.
    pub fn from_buffers<'a>(
        buffers: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Self, ProtocolError> {
        let operations = buffers
            .into_iter()
            .map(|buf| {
                serde_json::from_slice(buf)
                    .map_err(|e| ProtocolError::malformed(format!("queued operation: {e}")))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { operations })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Wire encoding of [`OperationBatch`] content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchCodec {
    Json,
    /// JSON compressed with zstd.
    ZstdJson,
}

impl BatchCodec {
    pub fn encode(&self, batch: &OperationBatch) -> Result<Vec<u8>, ProtocolError> {
        let json = serde_json::to_vec(batch)
            .map_err(|e| ProtocolError::malformed(format!("batch serialization: {e}")))?;
        match self {
            Self::Json => Ok(json),
            Self::ZstdJson => zstd::encode_all(json.as_slice(), ZSTD_LEVEL)
                .map_err(|e| ProtocolError::malformed(format!("batch compression: {e}"))),
        }
    }

    /// Decode batch content, refusing anything that expands past `max_bytes`.
    pub fn decode(&self, content: &[u8], max_bytes: u64) -> Result<OperationBatch, ProtocolError> {
        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let json = match self {
            Self::Json => {
                if content.len() > limit {
                    return Err(ProtocolError::malformed(format!(
                        "batch is {} bytes, limit is {limit}",
                        content.len()
                    )));
                }
                content.to_vec()
            }
            Self::ZstdJson => zstd::bulk::decompress(content, limit)
                .map_err(|e| ProtocolError::malformed(format!("batch decompression: {e}")))?,
        };
        serde_json::from_slice(&json)
            .map_err(|e| ProtocolError::malformed(format!("batch content: {e}")))
    }
}
