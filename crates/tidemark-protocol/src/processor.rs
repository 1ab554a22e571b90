use tidemark_crypto::{Signature, VerifyingKey};
use tidemark_types::{AnchoredOperation, ContentHash};
use tracing::trace;

use crate::error::OperationRejection;
use crate::operation::{OperationRequest, Patch};
use crate::state::{apply_patch, DidState};
use crate::traits::OperationProcessor;
use crate::version::ProtocolParameters;

/// Commitment/reveal operation processing shared by every protocol version.
pub struct DefaultOperationProcessor {
    parameters: ProtocolParameters,
}

impl DefaultOperationProcessor {
    pub fn new(parameters: ProtocolParameters) -> Self {
        Self { parameters }
    }
}

impl OperationProcessor for DefaultOperationProcessor {
    fn apply(
        &self,
        operation: &AnchoredOperation,
        state: Option<&DidState>,
    ) -> Result<DidState, OperationRejection> {
        if operation.operation_buffer.len() > self.parameters.max_operation_bytes {
            return Err(OperationRejection::Malformed(format!(
                "operation is {} bytes, limit is {}",
                operation.operation_buffer.len(),
                self.parameters.max_operation_bytes
            )));
        }
        let request = OperationRequest::parse(&operation.operation_buffer)?;
        if request.did_suffix()? != operation.did_suffix {
            return Err(OperationRejection::SuffixMismatch);
        }

        let txn = operation.transaction_number;
        let next = match (request, state) {
            (OperationRequest::Create(_), Some(_)) => return Err(OperationRejection::AlreadyCreated),
            (_, Some(state)) if state.deactivated => return Err(OperationRejection::Deactivated),

            (OperationRequest::Create(req), None) => {
                let mut document = Patch::new();
                // A delta that does not match the suffix data still creates
                // the DID, but without content or an update path.
                let update_commitment = if req.delta.hash()? == req.suffix_data.delta_hash {
                    apply_patch(&mut document, &req.delta.patch);
                    Some(req.delta.update_commitment)
                } else {
                    None
                };
                DidState {
                    document,
                    update_commitment,
                    recovery_commitment: Some(req.suffix_data.recovery_commitment),
                    last_operation_transaction_number: txn,
                    deactivated: false,
                }
            }

            (_, None) => return Err(OperationRejection::NotCreated),

            (OperationRequest::Update(req), Some(state)) => {
                check_reveal(&req.reveal_value, state.update_commitment.as_ref())?;
                check_signature(&req.reveal_value, &req.signed_payload()?, &req.signature)?;
                let mut next = state.clone();
                apply_patch(&mut next.document, &req.delta.patch);
                next.update_commitment = Some(req.delta.update_commitment);
                next.last_operation_transaction_number = txn;
                next
            }

            (OperationRequest::Recover(req), Some(state)) => {
                check_reveal(&req.reveal_value, state.recovery_commitment.as_ref())?;
                check_signature(&req.reveal_value, &req.signed_payload()?, &req.signature)?;
                let mut document = Patch::new();
                apply_patch(&mut document, &req.delta.patch);
                DidState {
                    document,
                    update_commitment: Some(req.delta.update_commitment),
                    recovery_commitment: Some(req.new_recovery_commitment),
                    last_operation_transaction_number: txn,
                    deactivated: false,
                }
            }

            (OperationRequest::Deactivate(req), Some(state)) => {
                check_reveal(&req.reveal_value, state.recovery_commitment.as_ref())?;
                check_signature(&req.reveal_value, &req.signed_payload()?, &req.signature)?;
                DidState {
                    document: Patch::new(),
                    update_commitment: None,
                    recovery_commitment: None,
                    last_operation_transaction_number: txn,
                    deactivated: true,
                }
            }
        };

        trace!(
            did = %operation.did_suffix,
            operation_type = %operation.operation_type,
            transaction_number = txn,
            "operation applied"
        );
        Ok(next)
    }
}

fn check_reveal(
    reveal: &VerifyingKey,
    commitment: Option<&ContentHash>,
) -> Result<(), OperationRejection> {
    match commitment {
        Some(c) if reveal.matches_commitment(c) => Ok(()),
        _ => Err(OperationRejection::StaleCommitment),
    }
}

fn check_signature(
    key: &VerifyingKey,
    payload: &[u8],
    signature: &Signature,
) -> Result<(), OperationRejection> {
    key.verify(payload, signature)
        .map_err(|_| OperationRejection::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tidemark_crypto::SigningKey;
    use tidemark_types::{DidSuffix, Transaction};

    use super::*;
    use crate::version::ProtocolVersionId;

    struct Keys {
        recovery: SigningKey,
        update: SigningKey,
    }

    fn keys() -> Keys {
        Keys {
            recovery: SigningKey::from_bytes([11; 32]),
            update: SigningKey::from_bytes([12; 32]),
        }
    }

    fn patch(value: serde_json::Value) -> Patch {
        value.as_object().cloned().unwrap_or_default()
    }

    fn anchored(request: &OperationRequest, number: u64) -> AnchoredOperation {
        let txn = Transaction {
            transaction_number: number,
            transaction_time: number,
            transaction_time_hash: "h".into(),
            anchor_string: String::new(),
            fee_paid: 0,
        };
        AnchoredOperation::new(
            &txn,
            0,
            request.did_suffix().unwrap(),
            request.operation_type(),
            request.to_bytes().unwrap(),
        )
    }

    fn processor() -> DefaultOperationProcessor {
        DefaultOperationProcessor::new(ProtocolVersionId::V1.parameters())
    }

    fn created(k: &Keys) -> (DidSuffix, DidState) {
        let create = OperationRequest::create(
            &k.recovery.verifying_key(),
            &k.update.verifying_key(),
            patch(json!({"name": "alice"})),
        )
        .unwrap();
        let state = processor().apply(&anchored(&create, 1), None).unwrap();
        (create.did_suffix().unwrap(), state)
    }

    #[test]
    fn create_then_update() {
        let k = keys();
        let (did, state) = created(&k);
        assert_eq!(state.document["name"], "alice");

        let next = SigningKey::from_bytes([13; 32]);
        let update =
            OperationRequest::update(&did, &k.update, &next.verifying_key(), patch(json!({"age": 30})))
                .unwrap();
        let state = processor().apply(&anchored(&update, 2), Some(&state)).unwrap();
        assert_eq!(state.document["age"], 30);
        assert_eq!(state.last_operation_transaction_number, 2);
        assert!(next.verifying_key().matches_commitment(&state.update_commitment.unwrap()));
    }

    #[test]
    fn reusing_an_update_key_is_stale() {
        let k = keys();
        let (did, state) = created(&k);
        let next = SigningKey::from_bytes([13; 32]);
        let first =
            OperationRequest::update(&did, &k.update, &next.verifying_key(), Patch::new()).unwrap();
        let state = processor().apply(&anchored(&first, 2), Some(&state)).unwrap();

        let replay =
            OperationRequest::update(&did, &k.update, &next.verifying_key(), Patch::new()).unwrap();
        assert_eq!(
            processor().apply(&anchored(&replay, 3), Some(&state)),
            Err(OperationRejection::StaleCommitment)
        );
    }

    #[test]
    fn forged_signature_is_rejected() {
        let k = keys();
        let (did, state) = created(&k);
        let OperationRequest::Update(mut req) =
            OperationRequest::update(&did, &k.update, &k.update.verifying_key(), Patch::new())
                .unwrap()
        else {
            panic!("expected update");
        };
        req.signature = SigningKey::from_bytes([99; 32]).sign(b"other");
        let forged = OperationRequest::Update(req);
        assert_eq!(
            processor().apply(&anchored(&forged, 2), Some(&state)),
            Err(OperationRejection::InvalidSignature)
        );
    }

    #[test]
    fn create_with_mismatched_delta_has_no_update_path() {
        let k = keys();
        let OperationRequest::Create(mut req) = OperationRequest::create(
            &k.recovery.verifying_key(),
            &k.update.verifying_key(),
            patch(json!({"name": "alice"})),
        )
        .unwrap() else {
            panic!("expected create");
        };
        req.delta.patch.insert("name".into(), json!("mallory"));
        let create = OperationRequest::Create(req);

        let state = processor().apply(&anchored(&create, 1), None).unwrap();
        assert!(state.document.is_empty());
        assert_eq!(state.update_commitment, None);
        assert!(state.recovery_commitment.is_some());

        let did = create.did_suffix().unwrap();
        let update =
            OperationRequest::update(&did, &k.update, &k.update.verifying_key(), Patch::new())
                .unwrap();
        assert_eq!(
            processor().apply(&anchored(&update, 2), Some(&state)),
            Err(OperationRejection::StaleCommitment)
        );
    }

    #[test]
    fn recover_replaces_document_and_keys() {
        let k = keys();
        let (did, state) = created(&k);
        let new_recovery = SigningKey::from_bytes([21; 32]);
        let new_update = SigningKey::from_bytes([22; 32]);
        let recover = OperationRequest::recover(
            &did,
            &k.recovery,
            &new_recovery.verifying_key(),
            &new_update.verifying_key(),
            patch(json!({"rotated": true})),
        )
        .unwrap();

        let state = processor().apply(&anchored(&recover, 2), Some(&state)).unwrap();
        assert_eq!(serde_json::Value::Object(state.document.clone()), json!({"rotated": true}));
        assert!(new_recovery
            .verifying_key()
            .matches_commitment(&state.recovery_commitment.unwrap()));

        // The old update key no longer works.
        let stale =
            OperationRequest::update(&did, &k.update, &k.update.verifying_key(), Patch::new())
                .unwrap();
        assert_eq!(
            processor().apply(&anchored(&stale, 3), Some(&state)),
            Err(OperationRejection::StaleCommitment)
        );
    }

    #[test]
    fn deactivate_blocks_everything_after() {
        let k = keys();
        let (did, state) = created(&k);
        let deactivate = OperationRequest::deactivate(&did, &k.recovery).unwrap();
        let state = processor().apply(&anchored(&deactivate, 2), Some(&state)).unwrap();
        assert!(state.deactivated);

        let recover = OperationRequest::recover(
            &did,
            &k.recovery,
            &k.recovery.verifying_key(),
            &k.update.verifying_key(),
            Patch::new(),
        )
        .unwrap();
        assert_eq!(
            processor().apply(&anchored(&recover, 3), Some(&state)),
            Err(OperationRejection::Deactivated)
        );
    }

    #[test]
    fn lifecycle_errors() {
        let k = keys();
        let (did, state) = created(&k);
        let create = OperationRequest::create(
            &k.recovery.verifying_key(),
            &k.update.verifying_key(),
            patch(json!({"name": "alice"})),
        )
        .unwrap();
        assert_eq!(
            processor().apply(&anchored(&create, 3), Some(&state)),
            Err(OperationRejection::AlreadyCreated)
        );

        let update =
            OperationRequest::update(&did, &k.update, &k.update.verifying_key(), Patch::new())
                .unwrap();
        assert_eq!(
            processor().apply(&anchored(&update, 3), None),
            Err(OperationRejection::NotCreated)
        );

        let mut wrong = anchored(&update, 3);
        wrong.did_suffix = DidSuffix::parse(&"f".repeat(64)).unwrap();
        assert_eq!(
            processor().apply(&wrong, Some(&state)),
            Err(OperationRejection::SuffixMismatch)
        );
    }

    #[test]
    fn oversized_and_garbage_buffers_are_malformed() {
        let k = keys();
        let (did, state) = created(&k);
        let mut op = anchored(
            &OperationRequest::deactivate(&did, &k.recovery).unwrap(),
            2,
        );
        op.operation_buffer = b"{not json".to_vec();
        assert!(matches!(
            processor().apply(&op, Some(&state)),
            Err(OperationRejection::Malformed(_))
        ));

        op.operation_buffer = vec![b' '; 5_000];
        assert!(matches!(
            processor().apply(&op, Some(&state)),
            Err(OperationRejection::Malformed(_))
        ));
    }
}
