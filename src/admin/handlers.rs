use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::health::{HealthCheckResult, HealthStatus, SystemHealthSummary};
use crate::resilience::{ApiMetrics, CircuitState, TargetSnapshot};

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub uptime_secs: u64,
    pub polling: bool,
    pub dependencies: usize,
    pub overall: Option<HealthStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service: String,
    pub critical: bool,
    pub consecutive_failures: u32,
    pub uptime_percent: Option<f64>,
    pub average_response_time_ms: Option<f64>,
    pub history: Vec<HealthCheckResult>,
}

#[derive(Debug, Serialize)]
pub struct ClientReport {
    pub name: String,
    pub base_url: Option<String>,
    pub aggregate: ApiMetrics,
    pub targets: Vec<TargetSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    pub target: String,
    pub circuit_state: CircuitState,
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let config = state.poller.config();
    Json(SystemStatus {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: config.version.clone(),
        environment: config.environment.clone(),
        uptime_secs: state.poller.uptime().as_secs(),
        polling: state.poller.is_running(),
        dependencies: state.poller.dependency_count(),
        overall: state.poller.last_summary().map(|s| s.overall),
    })
}

/// Latest summary; runs a cycle when asked to or when none exists yet.
pub async fn get_health(
    State(state): State<AdminState>,
    Query(query): Query<HealthQuery>,
) -> (StatusCode, Json<SystemHealthSummary>) {
    let summary = match state.poller.last_summary() {
        Some(summary) if !query.refresh => summary.as_ref().clone(),
        _ => state.poller.get_current_health().await,
    };
    let code = match summary.overall {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(summary))
}

pub async fn get_service_health(
    State(state): State<AdminState>,
    Path(service): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(dependency) = state
        .poller
        .dependencies()
        .into_iter()
        .find(|d| d.name == service)
    else {
        return not_found(format!("unknown service '{service}'"));
    };

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(ServiceReport {
        consecutive_failures: state.poller.consecutive_failures(&service),
        uptime_percent: state.poller.service_uptime(&service),
        average_response_time_ms: state.poller.average_response_time(&service),
        history: state.poller.service_history(&service, limit),
        critical: dependency.critical,
        service,
    })
    .into_response()
}

pub async fn get_client(State(state): State<AdminState>) -> Response {
    let Some(client) = state.client else {
        return not_found("no client configured".to_string());
    };
    Json(ClientReport {
        name: client.config().name.clone(),
        base_url: client.config().base_url.clone(),
        aggregate: client.aggregate_metrics(),
        targets: client.snapshot(),
    })
    .into_response()
}

pub async fn reset_circuit(
    State(state): State<AdminState>,
    Query(query): Query<ResetQuery>,
) -> Response {
    let Some(client) = state.client else {
        return not_found("no client configured".to_string());
    };
    client.reset_circuit(&query.target);
    tracing::info!(upstream = %query.target, "Circuit reset via admin API");
    Json(ResetResult {
        circuit_state: client.circuit_state(&query.target),
        target: query.target,
    })
    .into_response()
}
