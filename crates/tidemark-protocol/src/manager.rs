//! Time-based dispatch of protocol behavior.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bundle::{ProtocolBundle, ProtocolContext};
use crate::error::{ProtocolError, Result};
use crate::version::ProtocolVersionId;

/// One entry of the protocol version schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersionConfig {
    pub starting_blockchain_time: u64,
    pub version: String,
}

impl ProtocolVersionConfig {
    pub fn new(starting_blockchain_time: u64, version: impl Into<String>) -> Self {
        Self {
            starting_blockchain_time,
            version: version.into(),
        }
    }
}

/// Check a version schedule: non-empty, strictly increasing starting
/// times, known version identifiers.
pub fn validate_schedule(config: &[ProtocolVersionConfig]) -> Result<Vec<(u64, ProtocolVersionId)>> {
    if config.is_empty() {
        return Err(ProtocolError::Configuration(
            "protocol version list is empty".into(),
        ));
    }
    let mut schedule: Vec<(u64, ProtocolVersionId)> = Vec::with_capacity(config.len());
    for entry in config {
        if let Some(&(previous, _)) = schedule.last() {
            if entry.starting_blockchain_time <= previous {
                return Err(ProtocolError::Configuration(format!(
                    "starting time {} does not follow {previous}",
                    entry.starting_blockchain_time
                )));
            }
        }
        schedule.push((entry.starting_blockchain_time, entry.version.parse()?));
    }
    Ok(schedule)
}

/// Maps a ledger time to the protocol bundle in force at that time.
///
/// Bundles are built once at construction and never change, so lookups take
/// no locks.
pub struct VersionManager {
    /// Sorted by starting time.
    entries: Vec<(u64, Arc<ProtocolBundle>)>,
}

impl VersionManager {
    /// Validate `config` and build one bundle per distinct version.
    pub fn new(config: &[ProtocolVersionConfig], context: &ProtocolContext) -> Result<Self> {
        let schedule = validate_schedule(config)?;
        let mut built: HashMap<ProtocolVersionId, Arc<ProtocolBundle>> = HashMap::new();
        let entries = schedule
            .into_iter()
            .map(|(start, id)| {
                let bundle = built
                    .entry(id)
                    .or_insert_with(|| Arc::new(ProtocolBundle::build(id, context)))
                    .clone();
                (start, bundle)
            })
            .collect();

        let manager = Self { entries };
        for (start, bundle) in &manager.entries {
            info!(starting_time = start, version = %bundle.version(), "protocol version scheduled");
        }
        Ok(manager)
    }

    /// Assemble a manager from prebuilt bundles. Starting times must be
    /// strictly increasing.
    pub fn from_bundles(entries: Vec<(u64, Arc<ProtocolBundle>)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ProtocolError::Configuration(
                "protocol version list is empty".into(),
            ));
        }
        if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(ProtocolError::Configuration(
                "protocol starting times must be strictly increasing".into(),
            ));
        }
        Ok(Self { entries })
    }

    /// The bundle whose starting time is the greatest one not after `time`.
    pub fn version_for(&self, time: u64) -> Result<Arc<ProtocolBundle>> {
        let idx = self.entries.partition_point(|(start, _)| *start <= time);
        match idx.checked_sub(1) {
            Some(i) => Ok(self.entries[i].1.clone()),
            None => Err(ProtocolError::Configuration(format!(
                "no protocol version is configured for time {time}"
            ))),
        }
    }

    /// The configured schedule as `(starting_time, version)` pairs.
    pub fn schedule(&self) -> Vec<(u64, ProtocolVersionId)> {
        self.entries
            .iter()
            .map(|(start, bundle)| (*start, bundle.version()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tidemark_cas::InMemoryCas;
    use tidemark_chain::InMemoryBlockchain;
    use tidemark_store::{InMemoryOperationQueue, InMemoryOperationStore};

    use super::*;

    fn context() -> ProtocolContext {
        ProtocolContext {
            chain: Arc::new(InMemoryBlockchain::default()),
            cas: Arc::new(InMemoryCas::new()),
            operation_store: Arc::new(InMemoryOperationStore::new()),
            queue: Arc::new(InMemoryOperationQueue::new()),
        }
    }

    fn config(entries: &[(u64, &str)]) -> Vec<ProtocolVersionConfig> {
        entries
            .iter()
            .map(|(start, v)| ProtocolVersionConfig::new(*start, *v))
            .collect()
    }

    #[test]
    fn resolves_by_greatest_start_not_after_time() {
        let manager = VersionManager::new(&config(&[(0, "v1"), (1000, "v2")]), &context()).unwrap();
        assert_eq!(manager.version_for(0).unwrap().version(), ProtocolVersionId::V1);
        assert_eq!(manager.version_for(999).unwrap().version(), ProtocolVersionId::V1);
        assert_eq!(manager.version_for(1000).unwrap().version(), ProtocolVersionId::V2);
        assert_eq!(
            manager.version_for(1_000_000).unwrap().version(),
            ProtocolVersionId::V2
        );
    }

    #[test]
    fn same_version_shares_one_bundle() {
        let manager = VersionManager::new(
            &config(&[(0, "v1"), (10, "v2"), (20, "v1")]),
            &context(),
        )
        .unwrap();
        let a = manager.version_for(5).unwrap();
        let b = manager.version_for(25).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &manager.version_for(5).unwrap()));
        assert!(!Arc::ptr_eq(&a, &manager.version_for(15).unwrap()));
    }

    #[test]
    fn time_before_first_version_is_configuration_error() {
        let manager = VersionManager::new(&config(&[(100, "v1")]), &context()).unwrap();
        assert!(matches!(
            manager.version_for(99),
            Err(ProtocolError::Configuration(_))
        ));
        assert!(manager.version_for(100).is_ok());
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        for bad in [
            config(&[]),
            config(&[(0, "v1"), (0, "v2")]),
            config(&[(10, "v1"), (5, "v2")]),
            config(&[(0, "v9")]),
        ] {
            assert!(matches!(
                VersionManager::new(&bad, &context()),
                Err(ProtocolError::Configuration(_))
            ));
        }
    }

    #[test]
    fn from_bundles_checks_ordering() {
        let bundle = Arc::new(ProtocolBundle::build(ProtocolVersionId::V1, &context()));
        assert!(VersionManager::from_bundles(vec![]).is_err());
        assert!(VersionManager::from_bundles(vec![(5, bundle.clone()), (5, bundle.clone())]).is_err());
        let manager = VersionManager::from_bundles(vec![(0, bundle)]).unwrap();
        assert_eq!(manager.schedule(), vec![(0, ProtocolVersionId::V1)]);
    }

    proptest! {
        #[test]
        fn lookup_matches_linear_scan(
            gaps in proptest::collection::vec(1u64..1_000, 1..8),
            first in 0u64..1_000,
            time in 0u64..10_000,
        ) {
            let mut start = first;
            let mut entries = Vec::new();
            for (i, gap) in gaps.iter().enumerate() {
                let version = if i % 2 == 0 { "v1" } else { "v2" };
                entries.push(ProtocolVersionConfig::new(start, version));
                start += gap;
            }
            let manager = VersionManager::new(&entries, &context()).unwrap();

            let expected = entries
                .iter()
                .rev()
                .find(|e| e.starting_blockchain_time <= time)
                .map(|e| e.version.clone());
            match (manager.version_for(time), expected) {
                (Ok(bundle), Some(version)) => prop_assert_eq!(bundle.version().as_str(), version.as_str()),
                (Err(ProtocolError::Configuration(_)), None) => {}
                (got, want) => prop_assert!(false, "got {:?}, want {:?}", got.map(|b| b.version()), want),
            }
        }
    }
}
