//! Per-service probe results and history.
//!
//! # State Transitions
//! ```text
//! Idle → Probing: cycle starts a probe for the service
//! Probing → Recorded: result appended to history
//! ```
//!
//! # Design Decisions
//! - History is a bounded ring; oldest results are evicted first
//! - Any non-healthy result increments the consecutive failure counter
//! - A healthy result resets it

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePhase {
    Idle,
    Probing,
    Recorded,
}

/// Bounded result history plus failure streak for one service.
#[derive(Debug, Clone)]
pub struct ServiceHistory {
    results: VecDeque<HealthCheckResult>,
    limit: usize,
    consecutive_failures: u32,
    phase: ProbePhase,
}

impl ServiceHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(limit.min(64)),
            limit: limit.max(1),
            consecutive_failures: 0,
            phase: ProbePhase::Idle,
        }
    }

    pub fn begin_probe(&mut self) {
        self.phase = ProbePhase::Probing;
    }

    /// Append a result, evicting the oldest past the limit. Returns the failure streak.
    pub fn record(&mut self, result: HealthCheckResult) -> u32 {
        if result.status == HealthStatus::Healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        while self.results.len() >= self.limit {
            self.results.pop_front();
        }
        self.results.push_back(result);
        self.phase = ProbePhase::Recorded;
        self.consecutive_failures
    }

    pub fn phase(&self) -> ProbePhase {
        self.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last(&self) -> Option<&HealthCheckResult> {
        self.results.back()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Up to `limit` most recent results, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HealthCheckResult> {
        let skip = self.results.len().saturating_sub(limit);
        self.results.iter().skip(skip).cloned().collect()
    }

    /// Percentage of retained results that were healthy.
    pub fn uptime_percent(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let healthy = self
            .results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        Some(healthy as f64 * 100.0 / self.results.len() as f64)
    }

    pub fn average_response_time_ms(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let total: u64 = self.results.iter().map(|r| r.response_time_ms).sum();
        Some(total as f64 / self.results.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: HealthStatus, ms: u64) -> HealthCheckResult {
        HealthCheckResult {
            service: "api".to_string(),
            status,
            response_time_ms: ms,
            status_code: Some(200),
            error: None,
            timestamp: 0,
            metadata: None,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = ServiceHistory::new(1000);
        for i in 0..1005 {
            history.record(result(HealthStatus::Healthy, i));
        }
        assert_eq!(history.len(), 1000);
        assert_eq!(history.recent(1)[0].response_time_ms, 1004);
        assert_eq!(history.recent(2000)[0].response_time_ms, 5);
    }

    #[test]
    fn test_consecutive_failures() {
        let mut history = ServiceHistory::new(10);
        assert_eq!(history.record(result(HealthStatus::Unhealthy, 1)), 1);
        assert_eq!(history.record(result(HealthStatus::Degraded, 1)), 2);
        assert_eq!(history.record(result(HealthStatus::Unhealthy, 1)), 3);
        assert_eq!(history.record(result(HealthStatus::Healthy, 1)), 0);
        assert_eq!(history.phase(), ProbePhase::Recorded);
    }

    #[test]
    fn test_uptime_and_latency() {
        let mut history = ServiceHistory::new(10);
        assert_eq!(history.uptime_percent(), None);
        history.record(result(HealthStatus::Healthy, 100));
        history.record(result(HealthStatus::Healthy, 200));
        history.record(result(HealthStatus::Unhealthy, 300));
        history.record(result(HealthStatus::Healthy, 400));
        assert_eq!(history.uptime_percent(), Some(75.0));
        assert_eq!(history.average_response_time_ms(), Some(250.0));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
