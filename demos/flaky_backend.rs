//! A deliberately unreliable backend to point `service-guard` and the client demo at.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::json;

#[derive(Clone, Default)]
struct Counters {
    flaky: Arc<AtomicUsize>,
    limited: Arc<AtomicUsize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/flaky", get(flaky))
        .route("/limited", get(limited))
        .with_state(Counters::default());

    let addr = SocketAddr::from(([127, 0, 0, 1], 8090));
    println!("Flaky backend listening on http://{addr}");
    println!("  /health  always 200");
    println!("  /down    always 503");
    println!("  /flaky   503 twice, then 200");
    println!("  /limited 429 on every other call");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn flaky(State(counters): State<Counters>) -> (StatusCode, Json<serde_json::Value>) {
    let n = counters.flaky.fetch_add(1, Ordering::SeqCst);
    if n % 3 < 2 {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "message": "warming up", "call": n })))
    } else {
        (StatusCode::OK, Json(json!({ "message": "ok", "call": n })))
    }
}

async fn limited(State(counters): State<Counters>) -> (StatusCode, HeaderMap, &'static str) {
    let n = counters.limited.fetch_add(1, Ordering::SeqCst);
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", "10".parse().expect("static header"));
    if n % 2 == 1 {
        headers.insert("retry-after", "5".parse().expect("static header"));
        headers.insert("x-ratelimit-remaining", "0".parse().expect("static header"));
        (StatusCode::TOO_MANY_REQUESTS, headers, "slow down")
    } else {
        headers.insert("x-ratelimit-remaining", "1".parse().expect("static header"));
        (StatusCode::OK, headers, "ok")
    }
}
