//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("service_guard={},tower_http=info", config.log_level)));

    let (json, plain) = if config.json_logs {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    // A subscriber may already be installed (tests, embedding applications)
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
    {
        eprintln!("tracing subscriber already initialised: {}", e);
    }
}
