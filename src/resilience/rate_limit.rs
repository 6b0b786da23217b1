//! Rate-limit awareness from response headers.
//!
//! Reporting only: nothing here blocks calls. Callers inspect the table to back
//! off proactively.

use dashmap::DashMap;
use serde::Serialize;

use crate::resilience::context::unix_millis;
use crate::transport::HttpResponse;

/// Key used by clients that do not distinguish targets.
pub const DEFAULT_KEY: &str = "default";

/// Seconds to wait after a 429 without a usable `retry-after`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// Unix epoch seconds at which the window resets.
    pub reset: u64,
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    /// Parse `x-ratelimit-{limit,remaining,reset}`; all three must be present and numeric.
    pub fn from_headers(response: &HttpResponse) -> Option<Self> {
        let number = |name: &str| response.header(name)?.trim().parse::<u64>().ok();
        Some(Self {
            limit: number("x-ratelimit-limit")?,
            remaining: number("x-ratelimit-remaining")?,
            reset: number("x-ratelimit-reset")?,
            retry_after: number("retry-after"),
        })
    }

    /// Quota used up and the window has not reset yet.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 && self.reset > unix_millis() / 1000
    }
}

/// `retry-after` in seconds, defaulting when missing or not numeric.
pub fn retry_after_secs(response: &HttpResponse) -> u64 {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Latest known quota per target.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    entries: DashMap<String, RateLimitInfo>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `key` if the response carries rate-limit headers.
    pub fn record(&self, key: &str, response: &HttpResponse) -> bool {
        match RateLimitInfo::from_headers(response) {
            Some(info) => {
                if info.remaining == 0 {
                    tracing::warn!(upstream = %key, reset = info.reset, "Rate limit quota exhausted");
                }
                self.entries.insert(key.to_string(), info);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<RateLimitInfo> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn is_exhausted(&self, key: &str) -> bool {
        self.get(key).is_some_and(|info| info.is_exhausted())
    }

    pub fn snapshot(&self) -> Vec<(String, RateLimitInfo)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(remaining: &str) -> HttpResponse {
        HttpResponse::new(200)
            .with_header("X-RateLimit-Limit", "100")
            .with_header("X-RateLimit-Remaining", remaining)
            .with_header("X-RateLimit-Reset", "4102444800")
    }

    #[test]
    fn test_parses_headers() {
        let info = RateLimitInfo::from_headers(&limited("42")).unwrap();
        assert_eq!(info.limit, 100);
        assert_eq!(info.remaining, 42);
        assert_eq!(info.reset, 4_102_444_800);
        assert_eq!(info.retry_after, None);
    }

    #[test]
    fn test_malformed_headers_ignored() {
        let tracker = RateLimitTracker::new();
        assert!(!tracker.record(DEFAULT_KEY, &limited("many")));
        assert!(!tracker.record(DEFAULT_KEY, &HttpResponse::new(200)));
        assert!(tracker.get(DEFAULT_KEY).is_none());
    }

    #[test]
    fn test_overwrites_per_key() {
        let tracker = RateLimitTracker::new();
        tracker.record("orders", &limited("10"));
        tracker.record("orders", &limited("0"));
        tracker.record("storage", &limited("99"));

        assert_eq!(tracker.get("orders").unwrap().remaining, 0);
        assert!(tracker.is_exhausted("orders"));
        assert!(!tracker.is_exhausted("storage"));
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_huge_reset_does_not_overflow() {
        let tracker = RateLimitTracker::new();
        let response = HttpResponse::new(429)
            .with_header("x-ratelimit-limit", "10")
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "18446744073709551615");
        assert!(tracker.record("k", &response));
        assert!(tracker.is_exhausted("k"));

        let past = HttpResponse::new(200)
            .with_header("x-ratelimit-limit", "10")
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "1");
        tracker.record("k", &past);
        assert!(!tracker.is_exhausted("k"));
    }

    #[test]
    fn test_retry_after_default() {
        assert_eq!(retry_after_secs(&HttpResponse::new(429)), 60);
        assert_eq!(retry_after_secs(&HttpResponse::new(429).with_header("Retry-After", "30")), 30);
        // HTTP-date form is not interpreted
        let dated = HttpResponse::new(429).with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(retry_after_secs(&dated), 60);
    }
}
