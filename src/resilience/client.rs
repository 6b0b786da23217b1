//! Resilient HTTP client.
//!
//! # Responsibilities
//! - Resolve a request descriptor to a target and URL
//! - Gate each attempt through the target's circuit breaker
//! - Drive retries for transient failures
//! - Record statistics, rate-limit state and one telemetry event per attempt

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use url::Url;

use crate::config::ClientConfig;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
use crate::resilience::context::RequestContext;
use crate::resilience::error::{ApiError, ClientError, ClientResult};
use crate::resilience::rate_limit::{retry_after_secs, RateLimitInfo, RateLimitTracker, DEFAULT_KEY};
use crate::resilience::retries::retry_with_backoff_while;
use crate::resilience::stats::{ApiMetrics, MetricsRecorder};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What to call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: String,
    /// Absolute URL, or a path joined onto the client's `base_url`.
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Overrides the client's per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Overrides the target key derived from the URL.
    pub target: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            target: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new("POST", path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new("PUT", path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new("PATCH", path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Successful call result.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub data: serde_json::Value,
    pub request_id: String,
    pub retry_count: u32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Failed, eligible for retry.
    Transient,
    /// Failed, not eligible for retry.
    Failed,
    RateLimited,
    /// Not attempted, circuit open.
    Rejected,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Transient => "transient",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::Rejected => "rejected",
        }
    }
}

/// Telemetry emitted once per attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptEvent {
    pub request_id: String,
    pub target: String,
    pub method: String,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub outcome: AttemptOutcome,
}

/// Identity of the call an attempt belongs to.
struct CallSite<'a> {
    request_id: &'a str,
    target: &'a str,
    method: &'a str,
}

/// HTTP client with per-target circuit breaking, retries and rate-limit tracking.
pub struct ResilientClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    breakers: BreakerRegistry,
    metrics: MetricsRecorder,
    rate_limits: RateLimitTracker,
    events: broadcast::Sender<AttemptEvent>,
}

impl ResilientClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::debug!(
            client = %config.name,
            base_url = ?config.base_url,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_attempts = config.retry.max_attempts,
            "Resilient client created"
        );
        Self {
            breakers: BreakerRegistry::new(config.circuit_breaker.clone()),
            config,
            transport,
            metrics: MetricsRecorder::new(),
            rate_limits: RateLimitTracker::new(),
            events,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a request with breaker, retry and bookkeeping.
    pub async fn execute(&self, request: RequestDescriptor) -> ClientResult<ApiResponse> {
        let url = self.resolve_url(&request.path)?;
        let target = request
            .target
            .clone()
            .unwrap_or_else(|| target_for(&url));
        let mut ctx = RequestContext::new(&target, &request.method, url.as_str());
        let breaker = self.breakers.get_or_create(&target);

        let mut headers = self.config.default_headers.clone();
        headers.extend(request.headers.clone());
        headers.insert("x-request-id".to_string(), ctx.id.clone());
        let http = HttpRequest {
            method: request.method.to_ascii_uppercase(),
            url: url.to_string(),
            headers,
            body: request.body.clone(),
            timeout: request.timeout.unwrap_or_else(|| self.config.timeout()),
        };

        tracing::debug!(
            request_id = %ctx.id,
            upstream = %target,
            method = %http.method,
            url = %http.url,
            "Executing request"
        );

        let request_id = ctx.id.clone();
        let site = CallSite {
            request_id: &request_id,
            target: &target,
            method: &http.method,
        };
        // The breaker admits the call up front; an open circuit mid-sequence only stops retries
        let result = retry_with_backoff_while(
            &self.config.retry,
            &mut ctx,
            || breaker.state() != CircuitState::Open,
            |retry_count| self.attempt(&breaker, &site, http.clone(), retry_count),
        )
        .await;

        match result {
            Ok(mut response) => {
                response.retry_count = ctx.retry_count;
                response.duration = ctx.elapsed();
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.id,
                    upstream = %target,
                    retry_count = ctx.retry_count,
                    error = %err,
                    "Request failed"
                );
                Err(err)
            }
        }
    }

    /// Execute, giving up with `CANCELLED` as soon as `cancel` resolves.
    ///
    /// Remaining retries and any pending backoff timer are dropped.
    pub async fn execute_until<C>(&self, request: RequestDescriptor, cancel: C) -> ClientResult<ApiResponse>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.execute(request) => result,
            _ = cancel => Err(ApiError::cancelled().into()),
        }
    }

    /// Execute with an overall deadline covering every attempt and backoff.
    pub async fn execute_with_deadline(
        &self,
        request: RequestDescriptor,
        deadline: Duration,
    ) -> ClientResult<ApiResponse> {
        tokio::time::timeout(deadline, self.execute(request))
            .await
            .unwrap_or_else(|_| Err(ApiError::deadline_exceeded(deadline).into()))
    }

    pub async fn get(&self, path: &str) -> ClientResult<ApiResponse> {
        self.execute(RequestDescriptor::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> ClientResult<ApiResponse> {
        self.execute(RequestDescriptor::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> ClientResult<ApiResponse> {
        self.execute(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<ApiResponse> {
        self.execute(RequestDescriptor::delete(path)).await
    }

    async fn attempt(
        &self,
        breaker: &Arc<CircuitBreaker>,
        site: &CallSite<'_>,
        request: HttpRequest,
        retry_count: u32,
    ) -> ClientResult<ApiResponse> {
        let Some(permit) = breaker.try_acquire() else {
            tracing::warn!(request_id = %site.request_id, upstream = %site.target, "Circuit open, request rejected");
            self.emit(site, None, Duration::ZERO, retry_count, AttemptOutcome::Rejected);
            return Err(ClientError::CircuitOpen {
                target: site.target.to_string(),
            });
        };

        let started = Instant::now();
        let outcome = self.transport.send(request).await;
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                let err = ApiError::from_transport(&e);
                if err.retryable {
                    permit.failure();
                }
                self.metrics.record(site.target, latency_ms, true);
                let kind = if err.retryable { AttemptOutcome::Transient } else { AttemptOutcome::Failed };
                self.emit(site, None, elapsed, retry_count, kind);
                return Err(err.into());
            }
        };

        self.rate_limits.record(site.target, &response);
        let status = Some(response.status);

        if response.status == 429 {
            permit.failure();
            self.metrics.record(site.target, latency_ms, true);
            self.emit(site, status, elapsed, retry_count, AttemptOutcome::RateLimited);
            return Err(ClientError::RateLimited {
                target: site.target.to_string(),
                retry_after_secs: retry_after_secs(&response),
            });
        }

        if response.status >= 400 {
            let err = ApiError::from_response(&response);
            // A definitive client error still proves the target is up
            if err.retryable {
                permit.failure();
            } else {
                permit.success();
            }
            self.metrics.record(site.target, latency_ms, true);
            let kind = if err.retryable { AttemptOutcome::Transient } else { AttemptOutcome::Failed };
            self.emit(site, status, elapsed, retry_count, kind);
            return Err(err.into());
        }

        permit.success();
        self.metrics.record(site.target, latency_ms, false);
        self.emit(site, status, elapsed, retry_count, AttemptOutcome::Success);
        Ok(into_api_response(response, site.request_id))
    }

    fn emit(
        &self,
        site: &CallSite<'_>,
        status: Option<u16>,
        duration: Duration,
        retry_count: u32,
        outcome: AttemptOutcome,
    ) {
        tracing::debug!(
            request_id = %site.request_id,
            upstream = %site.target,
            method = %site.method,
            status = ?status,
            duration_ms = duration.as_millis() as u64,
            retry_count,
            outcome = outcome.as_str(),
            "Attempt completed"
        );
        metrics::record_attempt(site.target, outcome.as_str(), duration);

        // No subscribers is fine
        let _ = self.events.send(AttemptEvent {
            request_id: site.request_id.to_string(),
            target: site.target.to_string(),
            method: site.method.to_string(),
            status,
            duration_ms: duration.as_millis() as u64,
            retry_count,
            outcome,
        });
    }

    fn resolve_url(&self, path: &str) -> ClientResult<Url> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }
        let base = self.config.base_url.as_deref().ok_or_else(|| {
            ApiError::invalid_request(format!("relative path '{}' without a base_url", path))
        })?;
        let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
        Url::parse(&joined)
            .map_err(|e| ApiError::invalid_request(format!("invalid URL '{}': {}", joined, e)).into())
    }

    /// Target key used for relative paths.
    pub fn default_target(&self) -> String {
        self.config
            .base_url
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .map(|url| target_for(&url))
            .unwrap_or_else(|| DEFAULT_KEY.to_string())
    }

    /// Subscribe to per-attempt telemetry.
    pub fn subscribe_attempts(&self) -> broadcast::Receiver<AttemptEvent> {
        self.events.subscribe()
    }

    pub fn circuit_state(&self, target: &str) -> CircuitState {
        self.breakers
            .get(target)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn circuit_failures(&self, target: &str) -> u32 {
        self.breakers.get(target).map(|b| b.failures()).unwrap_or(0)
    }

    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        self.breakers.states()
    }

    /// Manually close a target's circuit.
    pub fn reset_circuit(&self, target: &str) {
        if let Some(breaker) = self.breakers.get(target) {
            breaker.reset();
        }
    }

    pub fn metrics(&self, target: &str) -> ApiMetrics {
        self.metrics.get(target)
    }

    pub fn aggregate_metrics(&self) -> ApiMetrics {
        self.metrics.aggregate()
    }

    pub fn rate_limit(&self, target: &str) -> Option<RateLimitInfo> {
        self.rate_limits.get(target)
    }

    /// Circuit not open, failure rate under 10%, average latency under 5s.
    pub fn is_healthy(&self, target: &str) -> bool {
        let open = self.circuit_state(target) == CircuitState::Open;
        self.metrics.get(target).is_healthy(open)
    }

    /// Every target seen so far, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets = self.metrics.targets();
        for (target, _) in self.breakers.states() {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets.sort();
        targets
    }

    /// Point-in-time view of every target's breaker, statistics and rate limit.
    pub fn snapshot(&self) -> Vec<TargetSnapshot> {
        self.targets()
            .into_iter()
            .map(|target| TargetSnapshot {
                circuit_state: self.circuit_state(&target),
                circuit_failures: self.circuit_failures(&target),
                metrics: self.metrics(&target),
                rate_limit: self.rate_limit(&target),
                healthy: self.is_healthy(&target),
                target,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub target: String,
    pub circuit_state: CircuitState,
    pub circuit_failures: u32,
    pub metrics: ApiMetrics,
    pub rate_limit: Option<RateLimitInfo>,
    pub healthy: bool,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.config.name)
            .field("base_url", &self.config.base_url)
            .field("targets", &self.metrics.targets())
            .finish()
    }
}

/// Target key: the URL origin, e.g. `https://api.example.com:8443`.
pub fn target_for(url: &Url) -> String {
    match url.origin() {
        origin @ url::Origin::Tuple(..) => origin.ascii_serialization(),
        url::Origin::Opaque(_) => DEFAULT_KEY.to_string(),
    }
}

fn into_api_response(response: HttpResponse, request_id: &str) -> ApiResponse {
    ApiResponse {
        status: response.status,
        data: response.json(),
        headers: response.headers,
        request_id: request_id.to_string(),
        retry_count: 0,
        duration: Duration::ZERO,
    }
}
