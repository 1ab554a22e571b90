use serde::{Deserialize, Serialize};
use tidemark_types::{ContentHash, TransactionNumber};

use crate::operation::Patch;

/// The state of one DID after replaying its operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DidState {
    pub document: Patch,
    /// `None` once updates are no longer possible (create with a bad delta,
    /// or after deactivation).
    pub update_commitment: Option<ContentHash>,
    pub recovery_commitment: Option<ContentHash>,
    pub last_operation_transaction_number: TransactionNumber,
    pub deactivated: bool,
}

/// Merge `patch` into `document` at top level; `null` removes the key.
pub fn apply_patch(document: &mut Patch, patch: &Patch) {
    for (key, value) in patch {
        if value.is_null() {
            document.remove(key);
        } else {
            document.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn patch_merges_and_removes() {
        let mut doc = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        let patch = json!({"b": null, "c": {"nested": true}})
            .as_object()
            .cloned()
            .unwrap();
        apply_patch(&mut doc, &patch);
        assert_eq!(Value::Object(doc), json!({"a": 1, "c": {"nested": true}}));
    }

    #[test]
    fn removing_missing_key_is_noop() {
        let mut doc = Patch::new();
        apply_patch(&mut doc, json!({"x": null}).as_object().unwrap());
        assert!(doc.is_empty());
    }
}
