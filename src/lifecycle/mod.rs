//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Build poller → Start polling → Bind admin listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Admin server drains → Poller stops after in-flight cycle
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal → Forced exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: poller first, then the admin surface
//! - Shutdown has a deadline: the admin server is abandoned after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{launch, Running, StartupError};
