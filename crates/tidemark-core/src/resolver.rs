use std::sync::Arc;

use tidemark_protocol::{DidState, OperationRejection, VersionManager};
use tidemark_store::OperationStore;
use tidemark_types::{AnchoredOperation, DidSuffix};
use tracing::{debug, trace};

use crate::error::ResolutionError;

/// An operation that replay skipped, with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedOperation {
    pub operation: AnchoredOperation,
    pub reason: OperationRejection,
}

/// The outcome of replaying every stored operation for one DID.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDid {
    pub did_suffix: DidSuffix,
    pub state: DidState,
    /// Operations that changed the state, in replay order.
    pub applied: Vec<AnchoredOperation>,
    pub rejected: Vec<RejectedOperation>,
}

/// Computes DID state from the operation store.
///
/// Resolution is a pure function of the stored operations and the version
/// schedule: each operation goes through the operation processor of the
/// version in force at its transaction time, in `(transaction_number,
/// operation_index)` order. Readers never block the observer.
#[derive(Clone)]
pub struct Resolver {
    operation_store: Arc<dyn OperationStore>,
    versions: Arc<VersionManager>,
}

impl Resolver {
    pub fn new(operation_store: Arc<dyn OperationStore>, versions: Arc<VersionManager>) -> Self {
        Self {
            operation_store,
            versions,
        }
    }

    /// Resolve `did` to its current state.
    ///
    /// Fails with `NotFound` unless the first operation in canonical order is
    /// a valid create, and with `Deactivated` (carrying the final replay) once
    /// the DID is deactivated.
    pub fn resolve(&self, did: &DidSuffix) -> Result<ResolvedDid, ResolutionError> {
        let mut operations = self.operation_store.get(did)?;
        operations.sort_by(AnchoredOperation::canonical_cmp);

        let mut state: Option<DidState> = None;
        let mut applied = Vec::new();
        let mut rejected = Vec::new();

        for operation in operations {
            let bundle = self.versions.version_for(operation.transaction_time)?;
            match bundle.operation_processor().apply(&operation, state.as_ref()) {
                Ok(next) => {
                    state = Some(next);
                    applied.push(operation);
                }
                Err(reason) if state.is_none() => {
                    debug!(
                        did = %did,
                        transaction = operation.transaction_number,
                        %reason,
                        "first operation is not a valid create"
                    );
                    return Err(ResolutionError::NotFound(did.clone()));
                }
                Err(reason) => {
                    trace!(
                        did = %did,
                        transaction = operation.transaction_number,
                        index = operation.operation_index,
                        %reason,
                        "operation rejected"
                    );
                    rejected.push(RejectedOperation { operation, reason });
                }
            }
        }

        let Some(state) = state else {
            return Err(ResolutionError::NotFound(did.clone()));
        };
        let resolved = ResolvedDid {
            did_suffix: did.clone(),
            state,
            applied,
            rejected,
        };
        if resolved.state.deactivated {
            return Err(ResolutionError::Deactivated {
                resolved: Box::new(resolved),
            });
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("versions", &self.versions.schedule())
            .finish_non_exhaustive()
    }
}
