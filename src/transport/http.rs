//! `reqwest`-backed transport.

use std::collections::HashMap;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use reqwest::Method;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Transport that issues requests through a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing client (connection pool, proxy settings, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = Method::from_str(&request.method.to_ascii_uppercase())
            .map_err(|e| TransportError::InvalidRequest(format!("method '{}': {}", request.method, e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_error(e, &request))?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_ascii_lowercase(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_error(e, &request))?
            .to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}

fn map_error(error: reqwest::Error, request: &HttpRequest) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(self.execute(request))
    }
}
