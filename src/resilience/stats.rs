//! Running request statistics.

use dashmap::DashMap;
use serde::Serialize;

use crate::resilience::context::unix_millis;

/// Failure rate at or above which a target is reported unhealthy.
pub const MAX_HEALTHY_FAILURE_RATE: f64 = 0.10;

/// Average latency at or above which a target is reported unhealthy.
pub const MAX_HEALTHY_AVG_RESPONSE_MS: f64 = 5000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiMetrics {
    pub requests: u64,
    pub failures: u64,
    pub avg_response_time_ms: f64,
    /// Unix epoch milliseconds of the last completed attempt.
    pub last_request_at: Option<u64>,
}

impl ApiMetrics {
    pub fn record(&mut self, latency_ms: f64, failed: bool) {
        self.requests += 1;
        if failed {
            self.failures += 1;
        }
        let n = self.requests as f64;
        self.avg_response_time_ms = (self.avg_response_time_ms * (n - 1.0) + latency_ms) / n;
        self.last_request_at = Some(unix_millis());
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }

    /// Advisory readiness signal.
    pub fn is_healthy(&self, circuit_open: bool) -> bool {
        !circuit_open
            && self.failure_rate() < MAX_HEALTHY_FAILURE_RATE
            && self.avg_response_time_ms < MAX_HEALTHY_AVG_RESPONSE_MS
    }

    /// Combine two counters as if all requests had been recorded on one.
    fn merge(&mut self, other: &ApiMetrics) {
        let total = self.requests + other.requests;
        if total > 0 {
            self.avg_response_time_ms = (self.avg_response_time_ms * self.requests as f64
                + other.avg_response_time_ms * other.requests as f64)
                / total as f64;
        }
        self.requests = total;
        self.failures += other.failures;
        self.last_request_at = self.last_request_at.max(other.last_request_at);
    }
}

/// Per-target request statistics.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    targets: DashMap<String, ApiMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, target: &str, latency_ms: f64, failed: bool) {
        self.targets
            .entry(target.to_string())
            .or_default()
            .record(latency_ms, failed);
    }

    pub fn get(&self, target: &str) -> ApiMetrics {
        self.targets
            .get(target)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn aggregate(&self) -> ApiMetrics {
        let mut total = ApiMetrics::default();
        for entry in self.targets.iter() {
            total.merge(entry.value());
        }
        total
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average_is_mean() {
        let latencies = [120.0, 80.0, 310.5, 42.0, 7.25, 1000.0];
        let mut metrics = ApiMetrics::default();
        for latency in latencies {
            metrics.record(latency, false);
        }
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        assert!((metrics.avg_response_time_ms - mean).abs() < 1e-9);
        assert_eq!(metrics.requests, 6);
        assert!(metrics.last_request_at.is_some());
    }

    #[test]
    fn test_health_predicate() {
        let mut metrics = ApiMetrics::default();
        for _ in 0..9 {
            metrics.record(100.0, false);
        }
        metrics.record(100.0, true);
        // Exactly 10% failures is not healthy
        assert!(!metrics.is_healthy(false));

        metrics.record(100.0, false);
        assert!(metrics.is_healthy(false));
        assert!(!metrics.is_healthy(true));

        let mut slow = ApiMetrics::default();
        slow.record(5000.0, false);
        assert!(!slow.is_healthy(false));
    }

    #[test]
    fn test_aggregate_across_targets() {
        let recorder = MetricsRecorder::new();
        recorder.record("a", 100.0, false);
        recorder.record("a", 300.0, true);
        recorder.record("b", 500.0, false);

        let total = recorder.aggregate();
        assert_eq!(total.requests, 3);
        assert_eq!(total.failures, 1);
        assert!((total.avg_response_time_ms - 300.0).abs() < 1e-9);
        assert_eq!(recorder.get("missing"), ApiMetrics::default());
    }
}
