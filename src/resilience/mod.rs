//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! ResilientClient::execute(descriptor):
//!     → context.rs (fresh RequestContext, correlation id)
//!     → retries.rs (drive attempts, backoff.rs between them)
//!         → circuit_breaker.rs (admit or reject without I/O)
//!         → transport (one HTTP exchange)
//!         → error.rs (classify: transient / terminal / rate limited)
//!     → stats.rs, rate_limit.rs (record outcome)
//!     → ApiResponse | ClientError
//! ```
//!
//! # Design Decisions
//! - Breakers, statistics and rate-limit entries are per target, never global
//! - Only transient failures count against a breaker
//! - 429 is surfaced to the caller instead of being retried
//! - Backoff sleeps are async and cancel with the call

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod context;
pub mod error;
pub mod rate_limit;
pub mod retries;
pub mod stats;

pub use circuit_breaker::{BreakerRegistry, CallPermit, CircuitBreaker, CircuitState};
pub use client::{ApiResponse, AttemptEvent, AttemptOutcome, RequestDescriptor, ResilientClient, TargetSnapshot};
pub use context::RequestContext;
pub use error::{is_retryable_status, ApiError, ClientError, ClientResult};
pub use rate_limit::{RateLimitInfo, RateLimitTracker};
pub use stats::{ApiMetrics, MetricsRecorder};
