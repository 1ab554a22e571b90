//! DID operation requests as they travel inside batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tidemark_crypto::{ContentHasher, Signature, SigningKey, VerifyingKey};
use tidemark_types::{ContentHash, DidSuffix, OperationType};

use crate::error::OperationRejection;

/// A top-level JSON merge patch applied to a DID document.
pub type Patch = Map<String, Value>;

/// The part of a create request the DID suffix is derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixData {
    pub delta_hash: ContentHash,
    pub recovery_commitment: ContentHash,
}

impl SuffixData {
    pub fn did_suffix(&self) -> Result<DidSuffix, OperationRejection> {
        let hash = hash_json(&ContentHasher::SUFFIX, self)?;
        DidSuffix::parse(&hash.to_hex()).map_err(|e| OperationRejection::Malformed(e.to_string()))
    }
}

/// Document changes plus the commitment for the next update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub update_commitment: ContentHash,
    #[serde(default)]
    pub patch: Patch,
}

impl Delta {
    pub fn hash(&self) -> Result<ContentHash, OperationRejection> {
        hash_json(&ContentHasher::DELTA, self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub suffix_data: SuffixData,
    pub delta: Delta,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub did_suffix: DidSuffix,
    /// The public key committed to by the current update commitment.
    pub reveal_value: VerifyingKey,
    pub delta: Delta,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoverRequest {
    pub did_suffix: DidSuffix,
    /// The public key committed to by the current recovery commitment.
    pub reveal_value: VerifyingKey,
    pub delta: Delta,
    pub new_recovery_commitment: ContentHash,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeactivateRequest {
    pub did_suffix: DidSuffix,
    pub reveal_value: VerifyingKey,
    pub signature: Signature,
}

// Signed payloads carry the operation kind so a signature cannot be replayed
// as a different operation type.

#[derive(Serialize)]
struct UpdatePayload<'a> {
    operation: &'static str,
    did_suffix: &'a DidSuffix,
    delta_hash: ContentHash,
}

#[derive(Serialize)]
struct RecoverPayload<'a> {
    operation: &'static str,
    did_suffix: &'a DidSuffix,
    delta_hash: ContentHash,
    new_recovery_commitment: &'a ContentHash,
}

#[derive(Serialize)]
struct DeactivatePayload<'a> {
    operation: &'static str,
    did_suffix: &'a DidSuffix,
}

impl UpdateRequest {
    pub fn signed_payload(&self) -> Result<Vec<u8>, OperationRejection> {
        update_payload(&self.did_suffix, &self.delta)
    }
}

impl RecoverRequest {
    pub fn signed_payload(&self) -> Result<Vec<u8>, OperationRejection> {
        recover_payload(&self.did_suffix, &self.delta, &self.new_recovery_commitment)
    }
}

impl DeactivateRequest {
    pub fn signed_payload(&self) -> Result<Vec<u8>, OperationRejection> {
        deactivate_payload(&self.did_suffix)
    }
}

fn update_payload(did_suffix: &DidSuffix, delta: &Delta) -> Result<Vec<u8>, OperationRejection> {
    to_json(&UpdatePayload {
        operation: "update",
        did_suffix,
        delta_hash: delta.hash()?,
    })
}

fn recover_payload(
    did_suffix: &DidSuffix,
    delta: &Delta,
    new_recovery_commitment: &ContentHash,
) -> Result<Vec<u8>, OperationRejection> {
    to_json(&RecoverPayload {
        operation: "recover",
        did_suffix,
        delta_hash: delta.hash()?,
        new_recovery_commitment,
    })
}

fn deactivate_payload(did_suffix: &DidSuffix) -> Result<Vec<u8>, OperationRejection> {
    to_json(&DeactivatePayload {
        operation: "deactivate",
        did_suffix,
    })
}

/// An operation request, tagged by `type` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationRequest {
    Create(CreateRequest),
    Update(UpdateRequest),
    Recover(RecoverRequest),
    Deactivate(DeactivateRequest),
}

impl OperationRequest {
    pub fn parse(bytes: &[u8]) -> Result<Self, OperationRejection> {
        serde_json::from_slice(bytes).map_err(|e| OperationRejection::Malformed(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, OperationRejection> {
        serde_json::from_value(value).map_err(|e| OperationRejection::Malformed(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, OperationRejection> {
        to_json(self)
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::Create(_) => OperationType::Create,
            Self::Update(_) => OperationType::Update,
            Self::Recover(_) => OperationType::Recover,
            Self::Deactivate(_) => OperationType::Deactivate,
        }
    }

    /// The DID this operation targets. For creates it is derived from the
    /// suffix data.
    pub fn did_suffix(&self) -> Result<DidSuffix, OperationRejection> {
        match self {
            Self::Create(req) => req.suffix_data.did_suffix(),
            Self::Update(req) => Ok(req.did_suffix.clone()),
            Self::Recover(req) => Ok(req.did_suffix.clone()),
            Self::Deactivate(req) => Ok(req.did_suffix.clone()),
        }
    }

    /// Build a create request committing to `recovery_key` and `update_key`.
    pub fn create(
        recovery_key: &VerifyingKey,
        update_key: &VerifyingKey,
        patch: Patch,
    ) -> Result<Self, OperationRejection> {
        let delta = Delta {
            update_commitment: update_key.commitment(),
            patch,
        };
        Ok(Self::Create(CreateRequest {
            suffix_data: SuffixData {
                delta_hash: delta.hash()?,
                recovery_commitment: recovery_key.commitment(),
            },
            delta,
        }))
    }

    /// Build an update signed with the currently committed update key.
    pub fn update(
        did_suffix: &DidSuffix,
        update_key: &SigningKey,
        next_update_key: &VerifyingKey,
        patch: Patch,
    ) -> Result<Self, OperationRejection> {
        let delta = Delta {
            update_commitment: next_update_key.commitment(),
            patch,
        };
        let signature = update_key.sign(&update_payload(did_suffix, &delta)?);
        Ok(Self::Update(UpdateRequest {
            did_suffix: did_suffix.clone(),
            reveal_value: update_key.verifying_key(),
            delta,
            signature,
        }))
    }

    /// Build a recover signed with the currently committed recovery key.
    pub fn recover(
        did_suffix: &DidSuffix,
        recovery_key: &SigningKey,
        new_recovery_key: &VerifyingKey,
        new_update_key: &VerifyingKey,
        patch: Patch,
    ) -> Result<Self, OperationRejection> {
        let delta = Delta {
            update_commitment: new_update_key.commitment(),
            patch,
        };
        let new_recovery_commitment = new_recovery_key.commitment();
        let signature =
            recovery_key.sign(&recover_payload(did_suffix, &delta, &new_recovery_commitment)?);
        Ok(Self::Recover(RecoverRequest {
            did_suffix: did_suffix.clone(),
            reveal_value: recovery_key.verifying_key(),
            delta,
            new_recovery_commitment,
            signature,
        }))
    }

    /// Build a deactivate signed with the currently committed recovery key.
    pub fn deactivate(
        did_suffix: &DidSuffix,
        recovery_key: &SigningKey,
    ) -> Result<Self, OperationRejection> {
        let signature = recovery_key.sign(&deactivate_payload(did_suffix)?);
        Ok(Self::Deactivate(DeactivateRequest {
            did_suffix: did_suffix.clone(),
            reveal_value: recovery_key.verifying_key(),
            signature,
        }))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, OperationRejection> {
    serde_json::to_vec(value).map_err(|e| OperationRejection::Malformed(e.to_string()))
}

fn hash_json<T: Serialize>(
    hasher: &ContentHasher,
    value: &T,
) -> Result<ContentHash, OperationRejection> {
    hasher
        .hash_json(value)
        .map_err(|e| OperationRejection::Malformed(e.to_string()))
}
