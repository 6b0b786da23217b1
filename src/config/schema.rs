//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Outbound client settings (breaker, retry, timeouts).
    pub client: ClientConfig,

    /// Health check poller settings and monitored dependencies.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Resilient client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client name used in logs and metrics.
    pub name: String,

    /// Base URL prepended to relative request paths.
    pub base_url: Option<String>,

    /// Per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Headers sent with every request.
    pub default_headers: HashMap<String, String>,

    /// Circuit breaker settings, applied per target.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_url: None,
            timeout_ms: 30_000,
            default_headers: HashMap::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial call, in milliseconds.
    pub open_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Multiplier applied per retry.
    pub backoff_factor: f64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

/// Health check poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Start the poller with the daemon.
    pub enabled: bool,

    /// Poll interval in seconds.
    pub interval_secs: u64,

    /// Default probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Extra probe attempts when a dependency does not respond.
    pub retries: u32,

    /// Delay between probe attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Consecutive failures before an alert is raised.
    pub alert_threshold: u32,

    /// Results retained per service.
    pub history_limit: usize,

    /// Version reported in summaries.
    pub version: String,

    /// Environment reported in summaries.
    pub environment: String,

    /// Monitored dependencies.
    pub dependencies: Vec<DependencyConfig>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_ms: 5000,
            retries: 0,
            retry_delay_ms: 1000,
            alert_threshold: 3,
            history_limit: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            dependencies: Vec::new(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// A monitored dependency as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DependencyConfig {
    /// Unique service name.
    pub name: String,

    /// Health endpoint URL.
    pub url: String,

    /// An unhealthy critical dependency makes the whole system unhealthy.
    #[serde(default)]
    pub critical: bool,

    #[serde(default = "default_method")]
    pub method: String,

    /// Overrides `health.timeout_ms` for this dependency.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,

    /// Response body must contain this text to count as healthy.
    #[serde(default)]
    pub body_contains: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Bearer token; the API is open when unset.
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.client.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.client.circuit_breaker.open_timeout(), Duration::from_secs(60));
        assert_eq!(config.client.retry.max_attempts, 3);
        assert_eq!(config.client.retry.base_delay_ms, 1000);
        assert_eq!(config.client.retry.backoff_factor, 2.0);
        assert_eq!(config.client.retry.max_delay_ms, 30_000);
        assert_eq!(config.health.interval(), Duration::from_secs(60));
        assert_eq!(config.health.alert_threshold, 3);
        assert_eq!(config.health.history_limit, 1000);
    }

    #[test]
    fn test_minimal_toml() {
        let config: GuardConfig = toml::from_str(
            r#"
            [client]
            base_url = "http://api.internal"

            [[health.dependencies]]
            name = "payments"
            url = "http://payments.internal/health"
            critical = true
            "#,
        )
        .unwrap();

        assert_eq!(config.client.base_url.as_deref(), Some("http://api.internal"));
        assert_eq!(config.client.retry.max_attempts, 3);
        let dep = &config.health.dependencies[0];
        assert!(dep.critical);
        assert_eq!(dep.method, "GET");
        assert_eq!(dep.expected_status, vec![200]);
        assert_eq!(dep.timeout_ms, None);
    }
}
