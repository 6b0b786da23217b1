//! Health polling and the admin API against loopback services.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{start_fixed_backend, unused_addr, MockResponse};
use service_guard::config::{DependencyConfig, GuardConfig, HealthConfig};
use service_guard::health::{
    BodyValidator, HealthPoller, HealthStatus, ServiceDependency, ServiceHealthCheck, SystemHealthSummary,
};
use service_guard::lifecycle::{launch, Shutdown};
use service_guard::transport::{HttpTransport, ReqwestTransport};

fn transport() -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::new())
}

fn dependency(name: &str, url: String, critical: bool) -> DependencyConfig {
    DependencyConfig {
        name: name.to_string(),
        url,
        critical,
        method: "GET".to_string(),
        timeout_ms: None,
        expected_status: vec![200],
        body_contains: None,
    }
}

#[tokio::test]
async fn test_mixed_dependencies_aggregate() {
    let db = start_fixed_backend(MockResponse::ok(r#"{"status":"ok"}"#)).await;
    let search = start_fixed_backend(MockResponse::status(503)).await;
    let cache = unused_addr().await;

    let poller = HealthPoller::new(
        HealthConfig {
            timeout_ms: 500,
            ..HealthConfig::default()
        },
        transport(),
    );
    poller.add_dependency(ServiceDependency::critical(
        ServiceHealthCheck::new("db", format!("http://{db}/health"))
            .validator(BodyValidator::json(|body| body["status"] == "ok")),
    ));
    poller.add_dependency(ServiceDependency::optional(ServiceHealthCheck::new(
        "search",
        format!("http://{search}/health"),
    )));
    poller.add_dependency(ServiceDependency::optional(ServiceHealthCheck::new(
        "cache",
        format!("http://{cache}/health"),
    )));

    let summary = poller.get_current_health().await;
    assert_eq!(summary.overall, HealthStatus::Degraded);

    let status_of = |name: &str| summary.services.iter().find(|r| r.service == name).unwrap().status;
    assert_eq!(status_of("db"), HealthStatus::Healthy);
    assert_eq!(status_of("search"), HealthStatus::Degraded);
    assert_eq!(status_of("cache"), HealthStatus::Unhealthy);

    // Losing a critical dependency takes the whole system down
    poller.add_dependency(ServiceDependency::critical(ServiceHealthCheck::new(
        "cache",
        format!("http://{cache}/health"),
    )));
    assert_eq!(poller.get_current_health().await.overall, HealthStatus::Unhealthy);
    assert_eq!(poller.consecutive_failures("cache"), 2);
    assert_eq!(poller.service_uptime("db"), Some(100.0));
}

#[tokio::test]
async fn test_listeners_run_in_order_and_failures_are_skipped() {
    let api = start_fixed_backend(MockResponse::ok("pong")).await;
    let config = HealthConfig {
        dependencies: vec![dependency("api", format!("http://{api}/ping"), true)],
        ..HealthConfig::default()
    };
    let poller = HealthPoller::new(config, transport());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = seen.clone();
    poller.on_summary(move |_| {
        first.lock().unwrap().push("first");
        Err("dashboard unreachable".into())
    });
    let second = seen.clone();
    poller.on_summary(move |summary: &SystemHealthSummary| {
        second.lock().unwrap().push(summary.overall.as_str());
        Ok(())
    });

    poller.get_current_health().await;
    assert_eq!(*seen.lock().unwrap(), vec!["first", "healthy"]);
}

async fn start_guard(api_key: Option<&str>) -> (service_guard::lifecycle::Running, String) {
    let healthy = start_fixed_backend(MockResponse::ok(r#"{"status":"ok"}"#)).await;
    let down = unused_addr().await;

    let mut config = GuardConfig::default();
    config.health.timeout_ms = 500;
    config.health.dependencies = vec![
        dependency("db", format!("http://{healthy}/health"), true),
        dependency("mailer", format!("http://{down}/health"), false),
    ];
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config.admin.api_key = api_key.map(str::to_string);
    config.client.base_url = Some(format!("http://{healthy}"));

    let running = launch(&config, transport(), Arc::new(Shutdown::new())).await.unwrap();
    let base = format!("http://{}", running.admin_addr.unwrap());
    (running, base)
}

#[tokio::test]
async fn test_admin_api_reports_health() {
    let (running, base) = start_guard(None).await;
    let http = reqwest::Client::new();

    let status: serde_json::Value = http.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["service"], "service-guard");
    assert_eq!(status["dependencies"], 2);
    assert_eq!(status["polling"], true);

    let res = http.get(format!("{base}/health?refresh=true")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let summary: SystemHealthSummary = res.json().await.unwrap();
    assert_eq!(summary.overall, HealthStatus::Degraded);
    assert_eq!(summary.services.len(), 2);

    let report: serde_json::Value = http
        .get(format!("{base}/health/mailer?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["critical"], false);
    assert_eq!(report["history"].as_array().unwrap().len(), 1);
    assert!(report["consecutive_failures"].as_u64().unwrap() >= 1);

    let missing = http.get(format!("{base}/health/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    let client = running.client.clone().unwrap();
    client.get("/health").await.unwrap();
    let report: serde_json::Value = http.get(format!("{base}/client")).send().await.unwrap().json().await.unwrap();
    assert_eq!(report["aggregate"]["requests"], 1);
    assert_eq!(report["targets"][0]["circuit_state"], "CLOSED");

    running.stop().await;
}

#[tokio::test]
async fn test_admin_api_unhealthy_is_503() {
    let (running, base) = start_guard(None).await;
    let down = unused_addr().await;
    running.poller.add_dependency(ServiceDependency::critical(
        ServiceHealthCheck::new("ledger", format!("http://{down}/health")).timeout(Duration::from_millis(500)),
    ));

    let res = reqwest::get(format!("{base}/health?refresh=true")).await.unwrap();
    assert_eq!(res.status(), 503);
    let summary: SystemHealthSummary = res.json().await.unwrap();
    assert_eq!(summary.overall, HealthStatus::Unhealthy);

    running.stop().await;
}

#[tokio::test]
async fn test_admin_api_requires_key_when_configured() {
    let (running, base) = start_guard(Some("s3cret")).await;
    let http = reqwest::Client::new();

    let res = http.get(format!("{base}/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = http
        .get(format!("{base}/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = http
        .get(format!("{base}/status"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    running.stop().await;
}

#[tokio::test]
async fn test_stop_ends_polling() {
    let (running, _base) = start_guard(None).await;
    let poller = running.poller.clone();
    assert!(poller.is_running());

    running.stop().await;
    assert!(!poller.is_running());
}
