//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the resilient client and the health poller from config
//! - Hand the client to the poller so failing calls show up in health reports
//! - Start background polling
//! - Bind the admin listener and begin serving
//!
//! # Design Decisions
//! - Fail fast: a bind error is fatal
//! - The listener starts last, so the API never serves an unstarted poller

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{admin_router, AdminState};
use crate::config::GuardConfig;
use crate::health::HealthPoller;
use crate::lifecycle::shutdown::Shutdown;
use crate::resilience::ResilientClient;
use crate::transport::HttpTransport;

/// How long the admin server may take to drain after shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind admin listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handles to everything [`launch`] started.
pub struct Running {
    pub poller: Arc<HealthPoller>,
    pub client: Option<Arc<ResilientClient>>,
    pub admin_addr: Option<SocketAddr>,
    shutdown: Arc<Shutdown>,
    admin_task: Option<JoinHandle<std::io::Result<()>>>,
}

/// Start polling and, when enabled, the admin API.
///
/// A client is built only when `client.base_url` is configured.
pub async fn launch(
    config: &GuardConfig,
    transport: Arc<dyn HttpTransport>,
    shutdown: Arc<Shutdown>,
) -> Result<Running, StartupError> {
    let client = config
        .client
        .base_url
        .as_ref()
        .map(|_| Arc::new(ResilientClient::new(config.client.clone(), transport.clone())));

    let mut poller = HealthPoller::new(config.health.clone(), transport);
    if let Some(client) = &client {
        poller = poller.with_client(client.clone());
    }
    let poller = Arc::new(poller);
    if config.health.enabled {
        poller.start();
    } else {
        tracing::info!("Health polling disabled");
    }

    let mut admin_addr = None;
    let mut admin_task = None;
    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.admin.bind_address.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.admin.bind_address.clone(),
            source,
        })?;

        let app = admin_router(AdminState {
            poller: poller.clone(),
            client: client.clone(),
            api_key: config.admin.api_key.clone(),
        });
        let signal = shutdown.clone();
        admin_task = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.wait().await })
                .await
        }));
        admin_addr = Some(addr);
        tracing::info!(address = %addr, "Admin API listening");
    }

    Ok(Running {
        poller,
        client,
        admin_addr,
        shutdown,
        admin_task,
    })
}

impl Running {
    pub fn shutdown(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    /// Trigger shutdown and wait for the poller and admin server to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.poller.shutdown().await;

        if let Some(task) = self.admin_task {
            match tokio::time::timeout(SHUTDOWN_DEADLINE, task).await {
                Ok(Ok(Ok(()))) => tracing::info!("Admin API stopped"),
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "Admin API failed"),
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API task panicked"),
                Err(_) => tracing::warn!(deadline = ?SHUTDOWN_DEADLINE, "Admin API did not drain in time"),
            }
        }
    }
}

impl std::fmt::Debug for Running {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Running")
            .field("poller", &self.poller)
            .field("client", &self.client)
            .field("admin_addr", &self.admin_addr)
            .finish()
    }
}
