//! Per-call request context.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use uuid::Uuid;

/// Context attached to one top-level `execute` call and all of its attempts.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, propagated as `x-request-id`.
    pub id: String,
    pub target: String,
    pub method: String,
    pub url: String,
    pub started_at: Instant,
    pub retry_count: u32,
}

impl RequestContext {
    pub fn new(target: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target: target.into(),
            method: method.into(),
            url: url.into(),
            started_at: Instant::now(),
            retry_count: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_get_unique_ids() {
        let a = RequestContext::new("t", "GET", "http://t/a");
        let b = RequestContext::new("t", "GET", "http://t/a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.retry_count, 0);
    }
}
