//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → client and poller are constructed from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → poller dependency set is replaced
//! ```
//!
//! # Design Decisions
//! - No global config; every component receives its section explicitly
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, ClientConfig, DependencyConfig, GuardConfig, HealthConfig,
    ObservabilityConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
