use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Health of the ingestion loop as seen by operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Ingestion is behind because of transient failures; it resumes on its own.
    Degraded {
        reason: String,
        since: DateTime<Utc>,
    },
    /// Ingestion has stopped and needs operator attention.
    Failed {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Shared, observable health signal.
#[derive(Debug)]
pub struct HealthMonitor {
    status: watch::Sender<HealthStatus>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        let (status, _) = watch::channel(HealthStatus::Healthy);
        Self { status }
    }

    pub fn status(&self) -> HealthStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.subscribe()
    }

    pub fn mark_healthy(&self) {
        self.status.send_if_modified(|s| {
            if s.is_healthy() {
                false
            } else {
                *s = HealthStatus::Healthy;
                true
            }
        });
    }

    /// Record a degradation. An ongoing degradation keeps its start time.
    pub fn mark_degraded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.status.send_modify(|s| {
            let since = match s {
                HealthStatus::Degraded { since, .. } => *since,
                _ => Utc::now(),
            };
            *s = HealthStatus::Degraded { reason, since };
        });
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.status.send_replace(HealthStatus::Failed {
            reason: reason.into(),
            since: Utc::now(),
        });
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
