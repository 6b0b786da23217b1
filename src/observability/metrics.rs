//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): attempts by target and outcome
//! - `guard_request_duration_seconds` (histogram): attempt latency by target
//! - `guard_retries_total` (counter): retries scheduled by target
//! - `guard_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `guard_health_status` (gauge): 0=healthy, 1=degraded, 2=unhealthy
//! - `guard_health_check_duration_seconds` (histogram): probe latency by service
//! - `guard_alerts_total` (counter): alerts raised by service

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthStatus;
use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_attempt(target: &str, outcome: &'static str, duration: Duration) {
    counter!("guard_requests_total", "target" => target.to_string(), "outcome" => outcome).increment(1);
    histogram!("guard_request_duration_seconds", "target" => target.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_retry(target: &str) {
    counter!("guard_retries_total", "target" => target.to_string()).increment(1);
}

pub fn record_circuit_state(target: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("guard_circuit_state", "target" => target.to_string()).set(value);
}

pub fn record_health(service: &str, status: HealthStatus, duration: Duration) {
    let value = match status {
        HealthStatus::Healthy => 0.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Unhealthy => 2.0,
    };
    gauge!("guard_health_status", "service" => service.to_string()).set(value);
    histogram!("guard_health_check_duration_seconds", "service" => service.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_alert(service: &str) {
    counter!("guard_alerts_total", "service" => service.to_string()).increment(1);
}
