//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, delays ordered)
//! - Check dependency names are unique and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{DependencyConfig, GuardConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let client = &config.client;
    if let Some(base_url) = &client.base_url {
        check_http_url("client.base_url", base_url, &mut errors);
    }
    if client.timeout_ms == 0 {
        errors.push(ValidationError::new("client.timeout_ms", "must be greater than 0"));
    }
    if client.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "client.circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }
    let retry = &client.retry;
    if !(retry.backoff_factor >= 1.0) {
        errors.push(ValidationError::new("client.retry.backoff_factor", "must be at least 1.0"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "client.retry.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    let health = &config.health;
    if health.interval_secs == 0 {
        errors.push(ValidationError::new("health.interval_secs", "must be greater than 0"));
    }
    if health.timeout_ms == 0 {
        errors.push(ValidationError::new("health.timeout_ms", "must be greater than 0"));
    }
    if health.alert_threshold == 0 {
        errors.push(ValidationError::new("health.alert_threshold", "must be greater than 0"));
    }
    if health.history_limit == 0 {
        errors.push(ValidationError::new("health.history_limit", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, dep) in health.dependencies.iter().enumerate() {
        validate_dependency(i, dep, &mut errors);
        if !seen.insert(dep.name.as_str()) {
            errors.push(ValidationError::new(
                format!("health.dependencies[{}].name", i),
                format!("duplicate service name '{}'", dep.name),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("admin.bind_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_dependency(index: usize, dep: &DependencyConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("health.dependencies[{}].{}", index, name);

    if dep.name.trim().is_empty() {
        errors.push(ValidationError::new(field("name"), "must not be empty"));
    }
    check_http_url(&field("url"), &dep.url, errors);
    if dep.timeout_ms == Some(0) {
        errors.push(ValidationError::new(field("timeout_ms"), "must be greater than 0"));
    }
    if dep.expected_status.is_empty() {
        errors.push(ValidationError::new(field("expected_status"), "must list at least one status"));
    }
    if let Some(bad) = dep.expected_status.iter().find(|s| !(100..=599).contains(*s)) {
        errors.push(ValidationError::new(
            field("expected_status"),
            format!("{} is not an HTTP status code", bad),
        ));
    }
}

fn check_http_url(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dependency(name: &str, url: &str) -> DependencyConfig {
        DependencyConfig {
            name: name.to_string(),
            url: url.to_string(),
            critical: false,
            method: "GET".to_string(),
            timeout_ms: None,
            expected_status: vec![200],
            body_contains: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GuardConfig::default();
        config.client.circuit_breaker.failure_threshold = 0;
        config.client.retry.backoff_factor = 0.5;
        config.health.interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "health.interval_secs"));
    }

    #[test]
    fn test_dependency_checks() {
        let mut config = GuardConfig::default();
        config.health.dependencies = vec![
            dependency("api", "http://api.internal/health"),
            dependency("api", "ftp://files.internal"),
            dependency("", "not a url"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate service name 'api'")));
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme 'ftp'")));
        assert!(errors.iter().any(|e| e.field == "health.dependencies[2].name"));
        assert!(errors.iter().any(|e| e.message.starts_with("invalid URL")));
    }
}
