//! Health check definitions and probe execution.
//!
//! # Responsibilities
//! - Describe how to probe one dependency
//! - Execute a probe bounded by its own timeout
//! - Classify the outcome as healthy, degraded or unhealthy

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use crate::config::DependencyConfig;
use crate::health::state::{HealthCheckResult, HealthStatus};
use crate::resilience::context::unix_millis;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Predicate over a probe response.
#[derive(Clone)]
pub struct BodyValidator(Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>);

impl BodyValidator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HttpResponse) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Body must contain `needle`.
    pub fn contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(move |response| String::from_utf8_lossy(&response.body).contains(&needle))
    }

    /// Predicate over the JSON body; fails for non-JSON bodies.
    pub fn json<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        Self::new(move |response| {
            serde_json::from_slice::<serde_json::Value>(&response.body)
                .map(|body| f(&body))
                .unwrap_or(false)
        })
    }

    pub fn validate(&self, response: &HttpResponse) -> bool {
        (self.0)(response)
    }
}

impl fmt::Debug for BodyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyValidator(..)")
    }
}

/// How to probe one dependency.
#[derive(Debug, Clone)]
pub struct ServiceHealthCheck {
    pub name: String,
    pub url: String,
    pub method: String,
    pub timeout: Duration,
    pub expected_status: Vec<u16>,
    pub validator: Option<BodyValidator>,
}

impl ServiceHealthCheck {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: "GET".to_string(),
            timeout: Duration::from_secs(5),
            expected_status: vec![200],
            validator: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn expect_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.expected_status = statuses.into();
        self
    }

    pub fn validator(mut self, validator: BodyValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// A monitored dependency.
#[derive(Debug, Clone)]
pub struct ServiceDependency {
    pub name: String,
    pub critical: bool,
    pub check: ServiceHealthCheck,
}

impl ServiceDependency {
    pub fn new(check: ServiceHealthCheck, critical: bool) -> Self {
        Self {
            name: check.name.clone(),
            critical,
            check,
        }
    }

    pub fn critical(check: ServiceHealthCheck) -> Self {
        Self::new(check, true)
    }

    pub fn optional(check: ServiceHealthCheck) -> Self {
        Self::new(check, false)
    }

    /// Build from the config file form; `default_timeout` applies when none is set.
    pub fn from_config(config: &DependencyConfig, default_timeout: Duration) -> Self {
        let mut check = ServiceHealthCheck::new(&config.name, &config.url)
            .method(&config.method)
            .timeout(config.timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout))
            .expect_status(config.expected_status.clone());
        if let Some(needle) = &config.body_contains {
            check = check.validator(BodyValidator::contains(needle));
        }
        Self::new(check, config.critical)
    }
}

/// Probe once. Never takes longer than `check.timeout`.
pub async fn run_probe(transport: &dyn HttpTransport, check: &ServiceHealthCheck) -> HealthCheckResult {
    let mut request = HttpRequest::new(check.method.to_ascii_uppercase(), &check.url, check.timeout);
    request
        .headers
        .insert("user-agent".to_string(), "service-guard-health-check".to_string());

    let started = Instant::now();
    let outcome = timeout(check.timeout, transport.send(request)).await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    let mut result = HealthCheckResult {
        service: check.name.clone(),
        status: HealthStatus::Unhealthy,
        response_time_ms,
        status_code: None,
        error: None,
        timestamp: unix_millis(),
        metadata: None,
    };

    match outcome {
        Ok(Ok(response)) => {
            result.status_code = Some(response.status);
            let body = response.json();
            if body.is_object() {
                result.metadata = Some(body);
            }

            if !check.expected_status.contains(&response.status) {
                result.status = HealthStatus::Degraded;
                result.error = Some(format!("unexpected status {}", response.status));
            } else if check.validator.as_ref().is_some_and(|v| !v.validate(&response)) {
                result.status = HealthStatus::Degraded;
                result.error = Some("response validation failed".to_string());
            } else {
                result.status = HealthStatus::Healthy;
            }
        }
        Ok(Err(e)) => {
            result.error = Some(e.to_string());
        }
        Err(_) => {
            result.error = Some(format!("health check timed out after {:?}", check.timeout));
        }
    }

    match result.status {
        HealthStatus::Healthy => tracing::debug!(service = %check.name, response_time_ms, "Health check passed"),
        _ => tracing::warn!(
            service = %check.name,
            status = %result.status,
            status_code = ?result.status_code,
            error = ?result.error,
            "Health check failed"
        ),
    }
    result
}

/// Probe, re-probing up to `retries` times while the service does not respond.
pub async fn probe_with_retries(
    transport: &dyn HttpTransport,
    check: &ServiceHealthCheck,
    retries: u32,
    retry_delay: Duration,
) -> HealthCheckResult {
    let mut result = run_probe(transport, check).await;
    let mut attempt = 0;
    while result.status == HealthStatus::Unhealthy && attempt < retries {
        attempt += 1;
        sleep(retry_delay).await;
        tracing::debug!(service = %check.name, attempt, "Retrying health check");
        result = run_probe(transport, check).await;
    }
    result
}
