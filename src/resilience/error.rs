//! Error taxonomy for outbound calls.
//!
//! Every terminal outcome of [`ResilientClient::execute`](super::client::ResilientClient::execute)
//! is either a typed success or one of the [`ClientError`] variants below.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::transport::{HttpResponse, TransportError};

/// A failed call that reached (or tried to reach) the remote side.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    /// `None` when no response was received.
    pub status_code: Option<u16>,
    pub code: String,
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

impl ApiError {
    /// Failure with no response at all (connect error, timeout).
    pub fn from_transport(error: &TransportError) -> Self {
        let code = match error {
            TransportError::Timeout(_) => "TIMEOUT",
            TransportError::Connect(_) => "NETWORK_ERROR",
            TransportError::InvalidRequest(_) => "INVALID_REQUEST",
            TransportError::Other(_) => "NETWORK_ERROR",
        };
        Self {
            message: error.to_string(),
            status_code: None,
            code: code.to_string(),
            details: None,
            // A malformed request will never succeed on retry
            retryable: !matches!(error, TransportError::InvalidRequest(_)),
        }
    }

    /// Failure carried by a non-success HTTP response.
    ///
    /// `message` and `code` are taken from the JSON body when the service provides them.
    pub fn from_response(response: &HttpResponse) -> Self {
        let body = response.json();
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", response.status));
        let code = body
            .get("code")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP_{}", response.status));

        Self {
            message,
            status_code: Some(response.status),
            code,
            details: (!body.is_null()).then_some(body),
            retryable: is_retryable_status(Some(response.status)),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::terminal("INVALID_REQUEST", message)
    }

    pub fn cancelled() -> Self {
        Self::terminal("CANCELLED", "request cancelled by caller")
    }

    pub fn deadline_exceeded(deadline: Duration) -> Self {
        Self::terminal(
            "DEADLINE_EXCEEDED",
            format!("request did not complete within {:?}", deadline),
        )
    }

    fn terminal(code: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            code: code.to_string(),
            details: None,
            retryable: false,
        }
    }
}

/// Classification rule: no response, 5xx, 429, 408 and 409 are transient.
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(s) => s >= 500 || matches!(s, 408 | 409 | 429),
    }
}

/// Outcome kinds surfaced to callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The call was attempted and failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Rejected without network I/O because the target's breaker is open.
    #[error("circuit breaker open for {target}")]
    CircuitOpen { target: String },

    /// The server answered 429.
    #[error("rate limited by {target}, retry after {retry_after_secs}s")]
    RateLimited { target: String, retry_after_secs: u64 },
}

impl ClientError {
    /// Whether the failure is transient by the taxonomy rules.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api(e) => e.retryable,
            ClientError::CircuitOpen { .. } => false,
            ClientError::RateLimited { .. } => true,
        }
    }

    /// Whether the retry driver may re-attempt automatically.
    ///
    /// Rate limiting is transient but left to the caller to requeue.
    pub fn should_retry(&self) -> bool {
        matches!(self, ClientError::Api(e) if e.retryable)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Api(e) => e.status_code,
            ClientError::CircuitOpen { .. } => None,
            ClientError::RateLimited { .. } => Some(429),
        }
    }

    /// Short message suitable for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::CircuitOpen { .. } => "Service temporarily unavailable. Please try again shortly.",
            ClientError::RateLimited { .. } => "Too many requests. Please wait before trying again.",
            ClientError::Api(e) if e.status_code.is_none() => "Unable to reach the service. Check your connection.",
            ClientError::Api(e) if e.status_code == Some(401) || e.status_code == Some(403) => {
                "You are not authorized to perform this action."
            }
            ClientError::Api(e) if e.status_code == Some(404) => "The requested resource was not found.",
            ClientError::Api(_) => "Request failed.",
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable_status(None));
        for status in [500, 502, 503, 504, 429, 408, 409] {
            assert!(is_retryable_status(Some(status)), "{} should be retryable", status);
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(Some(status)), "{} should not be retryable", status);
        }
    }

    #[test]
    fn test_from_response_uses_body_fields() {
        let response = HttpResponse::new(422)
            .with_body(r#"{"message":"amount must be positive","code":"VALIDATION"}"#);
        let err = ApiError::from_response(&response);
        assert_eq!(err.message, "amount must be positive");
        assert_eq!(err.code, "VALIDATION");
        assert_eq!(err.status_code, Some(422));
        assert!(!err.retryable);
        assert!(err.details.is_some());
    }

    #[test]
    fn test_from_response_fallbacks() {
        let err = ApiError::from_response(&HttpResponse::new(503));
        assert_eq!(err.message, "Request failed with status 503");
        assert_eq!(err.code, "HTTP_503");
        assert!(err.retryable);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_transport_errors() {
        let err = ApiError::from_transport(&TransportError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.code, "TIMEOUT");
        assert!(err.retryable);

        let err = ApiError::from_transport(&TransportError::InvalidRequest("bad".into()));
        assert!(!err.retryable);
    }

    #[test]
    fn test_client_error_kinds_are_distinguishable() {
        let open = ClientError::CircuitOpen { target: "payments".into() };
        let limited = ClientError::RateLimited { target: "payments".into(), retry_after_secs: 30 };
        assert!(!open.should_retry());
        assert!(limited.is_retryable());
        assert!(!limited.should_retry());
        assert_eq!(limited.status_code(), Some(429));
        assert_ne!(open.user_message(), ClientError::from(ApiError::cancelled()).user_message());
    }
}
