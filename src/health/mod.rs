//! Dependency health monitoring.
//!
//! # Data Flow
//! ```text
//! Poll cycle (poller.rs):
//!     Interval tick or out-of-band request
//!     → Probe every dependency in parallel (check.rs)
//!     → Append to bounded history, update failure streak (state.rs)
//!     → Alert when the streak reaches the threshold (alert.rs)
//!     → Aggregate into a system summary (summary.rs)
//!     → Notify summary listeners in registration order
//! ```
//!
//! # Design Decisions
//! - One unhealthy critical dependency makes the whole system unhealthy
//! - Non-critical failures only degrade the system
//! - Degraded probes count toward the failure streak

pub mod alert;
pub mod check;
pub mod poller;
pub mod state;
pub mod summary;

pub use alert::{AlertBus, HealthAlert, ListenerError, ListenerId, Listeners};
pub use check::{probe_with_retries, run_probe, BodyValidator, ServiceDependency, ServiceHealthCheck};
pub use poller::HealthPoller;
pub use state::{HealthCheckResult, HealthStatus, ProbePhase, ServiceHistory};
pub use summary::{aggregate_status, SystemHealthSummary};
