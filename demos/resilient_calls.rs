//! Drive the flaky backend demo through a `ResilientClient`.
//!
//! Run `cargo run --example flaky_backend` first.

use std::sync::Arc;

use service_guard::config::{CircuitBreakerConfig, ClientConfig, RetryConfig};
use service_guard::resilience::{ClientError, ResilientClient};
use service_guard::transport::ReqwestTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig {
        name: "demo".to_string(),
        base_url: Some("http://127.0.0.1:8090".to_string()),
        timeout_ms: 2_000,
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            open_timeout_ms: 5_000,
        },
        retry: RetryConfig {
            base_delay_ms: 200,
            ..RetryConfig::default()
        },
        ..ClientConfig::default()
    };
    let client = ResilientClient::new(config, Arc::new(ReqwestTransport::new()));
    let target = client.default_target();

    // 1. Retries absorb transient 503s
    let response = client.get("/flaky").await?;
    println!("/flaky -> {} after {} retries: {}", response.status, response.retry_count, response.data);

    // 2. 429 surfaces immediately with the server's retry-after
    for _ in 0..2 {
        match client.get("/limited").await {
            Ok(r) => println!("/limited -> {}", r.status),
            Err(ClientError::RateLimited { retry_after_secs, .. }) => {
                println!("/limited -> rate limited, retry after {retry_after_secs}s")
            }
            Err(e) => println!("/limited -> {e}"),
        }
    }
    println!("rate limit: {:?}", client.rate_limit(&target));

    // 3. A dead endpoint trips the breaker, later calls fail fast
    for i in 0..3 {
        match client.get("/down").await {
            Ok(r) => println!("/down #{i} -> {}", r.status),
            Err(e) => println!("/down #{i} -> {e} ({})", e.user_message()),
        }
    }
    println!("circuit: {}", client.circuit_state(&target));
    println!("stats: {:?}", client.metrics(&target));
    println!("healthy: {}", client.is_healthy(&target));

    Ok(())
}
