//! Protocol version identifiers and the parameters each version runs with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::BatchCodec;
use crate::error::ProtocolError;

/// The closed set of protocol versions this node can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersionId {
    V1,
    V2,
}

impl ProtocolVersionId {
    pub const ALL: [Self; 2] = [Self::V1, Self::V2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    pub fn parameters(&self) -> ProtocolParameters {
        match self {
            Self::V1 => ProtocolParameters {
                codec: BatchCodec::Json,
                max_operations_per_batch: 100,
                max_batch_bytes: 1_000_000,
                max_operation_bytes: 2_000,
                fee_model: FeeModel::PerOperation,
            },
            Self::V2 => ProtocolParameters {
                codec: BatchCodec::ZstdJson,
                max_operations_per_batch: 1_000,
                max_batch_bytes: 10_000_000,
                max_operation_bytes: 4_000,
                fee_model: FeeModel::PerOperationWithFloor,
            },
        }
    }
}

impl fmt::Display for ProtocolVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(ProtocolError::Configuration(format!(
                "unknown protocol version '{other}'"
            ))),
        }
    }
}

/// How the required fee scales with the number of operations in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeModel {
    /// `normalized_fee * operation_count`
    PerOperation,
    /// `max(normalized_fee, normalized_fee * operation_count)`
    PerOperationWithFloor,
}

/// Limits and encodings that differ between protocol versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolParameters {
    pub codec: BatchCodec,
    pub max_operations_per_batch: usize,
    /// Upper bound on (decompressed) batch content.
    pub max_batch_bytes: u64,
    pub max_operation_bytes: usize,
    pub fee_model: FeeModel,
}

impl ProtocolParameters {
    /// The fee a batch of `operation_count` operations must pay.
    pub fn required_fee(&self, normalized_fee: u64, operation_count: usize) -> u64 {
        let per_operation = normalized_fee.saturating_mul(operation_count as u64);
        match self.fee_model {
            FeeModel::PerOperation => per_operation,
            FeeModel::PerOperationWithFloor => per_operation.max(normalized_fee),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ids_parse_and_display() {
        for id in ProtocolVersionId::ALL {
            assert_eq!(id.as_str().parse::<ProtocolVersionId>().unwrap(), id);
        }
        let err = "v3".parse::<ProtocolVersionId>().unwrap_err();
        assert!(matches!(err, ProtocolError::Configuration(_)));
    }

    #[test]
    fn v2_raises_limits() {
        let v1 = ProtocolVersionId::V1.parameters();
        let v2 = ProtocolVersionId::V2.parameters();
        assert!(v2.max_operations_per_batch > v1.max_operations_per_batch);
        assert!(v2.max_batch_bytes > v1.max_batch_bytes);
        assert_eq!(v1.codec, BatchCodec::Json);
        assert_eq!(v2.codec, BatchCodec::ZstdJson);
    }

    #[test]
    fn fee_models() {
        let v1 = ProtocolVersionId::V1.parameters();
        let v2 = ProtocolVersionId::V2.parameters();
        assert_eq!(v1.required_fee(5, 3), 15);
        assert_eq!(v2.required_fee(5, 3), 15);
        assert_eq!(v1.required_fee(5, 0), 0);
        assert_eq!(v2.required_fee(5, 0), 5);
        assert_eq!(v1.required_fee(u64::MAX, 2), u64::MAX);
    }
}
