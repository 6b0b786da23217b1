//! Resilient outbound HTTP calls and dependency health monitoring.
//!
//! - [`resilience`]: per-target circuit breaking, retry with backoff, rate-limit
//!   tracking and call statistics around an [`transport::HttpTransport`]
//! - [`health`]: periodic parallel probing of dependencies with history,
//!   aggregate status and alerting
//! - [`admin`], [`lifecycle`]: the daemon surface

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use config::GuardConfig;
pub use health::HealthPoller;
pub use lifecycle::Shutdown;
pub use resilience::ResilientClient;
