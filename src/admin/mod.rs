//! Admin HTTP surface.
//!
//! # Routes
//! ```text
//! GET  /status                      process status
//! GET  /health[?refresh=true]       latest system summary (503 when unhealthy)
//! GET  /health/{service}[?limit=n]  one dependency's history and uptime
//! GET  /client                      per-target breaker, statistics, rate limits
//! POST /client/circuits/reset?target=...
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::health::HealthPoller;
use crate::resilience::ResilientClient;
use self::auth::require_api_key;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub poller: Arc<HealthPoller>,
    pub client: Option<Arc<ResilientClient>>,
    /// When set, every route requires `Authorization: Bearer <key>`.
    pub api_key: Option<String>,
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/health", get(get_health))
        .route("/health/{service}", get(get_service_health))
        .route("/client", get(get_client))
        .route("/client/circuits/reset", post(reset_circuit))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
