//! service-guard daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     guard.toml ──▶ config loader ──▶ ┌──────────────────────────────┐
//!         │                            │        HealthPoller          │
//!         └── watcher (hot reload) ──▶ │  interval ─▶ parallel probes │──▶ alerts, listeners
//!                                      │  history / aggregate status  │
//!                                      └──────────────┬───────────────┘
//!                                                     │
//!     guard-cli / curl ──────────────▶  admin API  ◀──┘
//!                                         │
//!                                         └──▶ ResilientClient statistics
//!                                              (breaker / retry / rate limit)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use service_guard::config::watcher::ConfigWatcher;
use service_guard::config::{load_config, GuardConfig};
use service_guard::health::{HealthPoller, HealthStatus};
use service_guard::lifecycle::{launch, signals, Shutdown};
use service_guard::observability::{logging, metrics};
use service_guard::transport::{HttpTransport, ReqwestTransport};

#[derive(Parser, Debug)]
#[command(name = "service-guard", version, about = "Dependency health monitor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "guard.toml")]
    config: PathBuf,

    /// Run a single health cycle, print the summary and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, from_file) = if args.config.exists() {
        (load_config(&args.config)?, true)
    } else {
        (GuardConfig::default(), false)
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-guard starting");
    if !from_file {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }
    tracing::info!(
        dependencies = config.health.dependencies.len(),
        interval_secs = config.health.interval_secs,
        admin = %config.admin.bind_address,
        "Configuration loaded"
    );

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());

    if args.once {
        let poller = HealthPoller::new(config.health.clone(), transport);
        let summary = poller.get_current_health().await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        if summary.overall == HealthStatus::Unhealthy {
            std::process::exit(1);
        }
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let running = launch(&config, transport, shutdown.clone()).await?;
    signals::spawn_signal_handler(shutdown.clone());

    // Keep the watcher alive for the life of the process
    let _watcher = if from_file {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config, &config.health);
        let poller = running.poller.clone();
        tokio::spawn(async move {
            while let Some(dependencies) = updates.recv().await {
                poller.set_dependencies(dependencies);
            }
        });
        match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    shutdown.wait().await;
    running.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
