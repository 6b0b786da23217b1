//! Outbound HTTP transport boundary.
//!
//! # Data Flow
//! ```text
//! ResilientClient / HealthPoller
//!     → HttpRequest (method, url, headers, body, timeout)
//!     → HttpTransport::send
//!     → HttpResponse (status, headers, body) | TransportError
//! ```
//!
//! # Design Decisions
//! - The resilience layer never talks to an HTTP library directly
//! - A transport error means no response was received at all
//! - Timeouts are enforced by the transport and reported distinctly

pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

pub use self::http::ReqwestTransport;

/// A single outbound request as seen by the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout,
        }
    }
}

/// Response received from the remote side, regardless of status.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON, falling back to a string value for non-JSON payloads.
    pub fn json(&self) -> serde_json::Value {
        if self.body.is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&self.body).into_owned())
        })
    }
}

/// Failures where no HTTP response was obtained.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Capability to perform one HTTP exchange.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}
