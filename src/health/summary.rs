//! Aggregate system health.

use serde::{Deserialize, Serialize};

use crate::health::state::{HealthCheckResult, HealthStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    pub overall: HealthStatus,
    pub services: Vec<HealthCheckResult>,
    /// Seconds since the poller was created.
    pub uptime_secs: u64,
    pub version: String,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    pub environment: String,
}

/// Combine `(critical, status)` pairs into one status.
///
/// Unhealthy if any critical dependency is unhealthy; otherwise degraded if any
/// dependency is not healthy; otherwise healthy.
pub fn aggregate_status<I>(entries: I) -> HealthStatus
where
    I: IntoIterator<Item = (bool, HealthStatus)>,
{
    let mut overall = HealthStatus::Healthy;
    for (critical, status) in entries {
        match status {
            HealthStatus::Unhealthy if critical => return HealthStatus::Unhealthy,
            HealthStatus::Healthy => {}
            _ => overall = HealthStatus::Degraded,
        }
    }
    overall
}
