//! Node configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidemark_protocol::{validate_schedule, ProtocolVersionConfig};

use crate::error::{CoreError, CoreResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Protocol version schedule, ordered by starting ledger time.
    pub protocol_versions: Vec<ProtocolVersionConfig>,
    pub scheduler: SchedulerConfig,
    pub observer: ObserverConfig,
    pub retry: RetryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol_versions: vec![ProtocolVersionConfig::new(0, "v1")],
            scheduler: SchedulerConfig::default(),
            observer: ObserverConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between the end of one write attempt and the start of the next.
    pub batch_interval_ms: u64,
    /// Upper bound on one write attempt.
    pub write_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: 10_000,
            write_timeout_ms: 60_000,
        }
    }
}

impl SchedulerConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub poll_interval_ms: u64,
    /// Upper bound on each ledger or CAS call made while ingesting.
    pub call_timeout_ms: u64,
    /// Processed transactions checked in the first fork-anchor round.
    pub fork_initial_window: u64,
    /// Deepest fork to search for before giving up. `None` searches all the
    /// way back to genesis.
    pub max_fork_depth: Option<u64>,
    /// Fetch attempts for an unavailable batch before it is dropped.
    pub unresolvable_max_attempts: u32,
    /// Delay before the first retry of an unavailable batch; doubles with
    /// each attempt.
    pub unresolvable_retry_base_secs: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            call_timeout_ms: 30_000,
            fork_initial_window: 10,
            max_fork_depth: None,
            unresolvable_max_attempts: 5,
            unresolvable_retry_base_secs: 60,
        }
    }
}

impl ObserverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        toml::from_str(s).map_err(|e| CoreError::Configuration(e.to_string()))
    }

    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_schedule(&self.protocol_versions)?;

        let nonzero = [
            ("scheduler.batch_interval_ms", self.scheduler.batch_interval_ms),
            ("scheduler.write_timeout_ms", self.scheduler.write_timeout_ms),
            ("observer.poll_interval_ms", self.observer.poll_interval_ms),
            ("observer.call_timeout_ms", self.observer.call_timeout_ms),
            ("observer.fork_initial_window", self.observer.fork_initial_window),
            ("observer.unresolvable_max_attempts", u64::from(self.observer.unresolvable_max_attempts)),
            ("retry.max_attempts", u64::from(self.retry.max_attempts)),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::Configuration(format!("{name} must be greater than zero")));
        }
        if self.observer.max_fork_depth == Some(0) {
            return Err(CoreError::Configuration(
                "observer.max_fork_depth must be greater than zero when set".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CoreError::Configuration(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tidemark_protocol::ProtocolError;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = NodeConfig::default();
        c.validate().unwrap();
        assert_eq!(c.protocol_versions, vec![ProtocolVersionConfig::new(0, "v1")]);
        assert_eq!(c.observer.max_fork_depth, None);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let c = NodeConfig::from_toml_str(
            r#"
            [[protocol_versions]]
            starting_blockchain_time = 0
            version = "v1"

            [[protocol_versions]]
            starting_blockchain_time = 1000
            version = "v2"

            [observer]
            max_fork_depth = 500
            "#,
        )
        .unwrap();
        c.validate().unwrap();
        assert_eq!(c.protocol_versions.len(), 2);
        assert_eq!(c.observer.max_fork_depth, Some(500));
        assert_eq!(c.observer.poll_interval_ms, ObserverConfig::default().poll_interval_ms);
        assert_eq!(c.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn rejects_bad_schedules() {
        for text in [
            "protocol_versions = []",
            r#"protocol_versions = [{ starting_blockchain_time = 5, version = "v1" }, { starting_blockchain_time = 5, version = "v2" }]"#,
            r#"protocol_versions = [{ starting_blockchain_time = 0, version = "v7" }]"#,
        ] {
            let err = NodeConfig::from_toml_str(text).unwrap().validate().unwrap_err();
            assert!(
                matches!(err, CoreError::Protocol(ProtocolError::Configuration(_))),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn rejects_zero_intervals_and_inverted_backoff() {
        let mut c = NodeConfig::default();
        c.scheduler.batch_interval_ms = 0;
        assert!(matches!(c.validate(), Err(CoreError::Configuration(_))));

        let mut c = NodeConfig::default();
        c.retry.initial_backoff_ms = 10_000;
        assert!(matches!(c.validate(), Err(CoreError::Configuration(_))));

        let mut c = NodeConfig::default();
        c.observer.max_fork_depth = Some(0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn unknown_toml_is_configuration_error() {
        assert!(matches!(
            NodeConfig::from_toml_str("scheduler = 3"),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn load_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        let mut config = NodeConfig::default();
        config.protocol_versions.push(ProtocolVersionConfig::new(1000, "v2"));
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(NodeConfig::load(&path).unwrap(), config);
        assert!(matches!(
            NodeConfig::load(&dir.path().join("missing.toml")),
            Err(CoreError::Io(_))
        ));
    }
}
