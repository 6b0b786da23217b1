//! Circuit breaker for outbound targets.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: target assumed down, requests fail fast
//! - Half-Open: testing if target recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call after open timeout has elapsed
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (timeout clock restarts)
//! ```
//!
//! # Design Decisions
//! - Per-target circuit breaker (not global)
//! - Fail fast in Open state (no network I/O)
//! - Single trial in Half-Open, held by a permit that is released on drop

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Breaker guarding one target.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent even if a holder panicked: every write is a plain store
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Ask to place a call. `None` means the call must be rejected.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() > self.config.open_timeout())
                    .unwrap_or(true);
                if !elapsed {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                true
            }
        };
        if trial {
            inner.trial_in_flight = true;
        }

        Some(CallPermit {
            breaker: Arc::clone(self),
            trial,
            settled: false,
        })
    }

    /// Record a call outcome proving the target is reachable.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.trial_in_flight = false;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Record a transient failure.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.trial_in_flight = false;
        match inner.state {
            CircuitState::Closed => {
                inner.last_failure = Some(Instant::now());
                if inner.failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.last_failure = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            // Late result of a call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                upstream = %self.target,
                from = %from,
                failures = inner.failures,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(upstream = %self.target, from = %from, to = %to, "Circuit breaker transition"),
        }
        metrics::record_circuit_state(&self.target, to);
    }
}

/// Admission to place one call through a breaker.
///
/// Dropping an unsettled trial permit (e.g. the call was cancelled) frees the
/// Half-Open slot without changing state.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}

/// Breakers keyed by target, created on first use.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(target) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(target, self.config.clone())))
            .value()
            .clone()
    }

    pub fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(target).map(|b| Arc::clone(b.value()))
    }

    /// Snapshot of `(target, state)` for every known target.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "payments",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_timeout_ms: 60_000,
            },
        ))
    }

    fn fail(b: &Arc<CircuitBreaker>) {
        b.try_acquire().expect("call admitted").failure();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let b = breaker(3);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let b = breaker(3);
        fail(&b);
        fail(&b);
        b.try_acquire().unwrap().success();
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_trial() {
        let b = breaker(1);
        fail(&b);
        assert!(b.try_acquire().is_none());

        // Exactly the timeout is not enough; it must be exceeded
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(b.try_acquire().is_none());
        tokio::time::advance(Duration::from_millis(1)).await;

        let trial = b.try_acquire().expect("trial admitted");
        assert!(trial.is_trial());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().is_none(), "second concurrent trial rejected");

        trial.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_clock() {
        let b = breaker(1);
        fail(&b);
        tokio::time::advance(Duration::from_secs(61)).await;

        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let b = breaker(1);
        fail(&b);
        tokio::time::advance(Duration::from_secs(61)).await;

        drop(b.try_acquire().unwrap());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().is_some());
    }

    #[test]
    fn test_registry_isolates_targets() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout_ms: 1000,
        });
        registry.get_or_create("a").record_failure();

        assert_eq!(registry.get_or_create("a").state(), CircuitState::Open);
        assert_eq!(registry.get_or_create("b").state(), CircuitState::Closed);
        assert!(Arc::ptr_eq(&registry.get_or_create("a"), &registry.get("a").unwrap()));
        assert_eq!(registry.states().len(), 2);
    }
}
