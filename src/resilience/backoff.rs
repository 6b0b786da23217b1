//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay to wait after the failed attempt with zero-based index `attempt`.
///
/// `min(base_delay * backoff_factor^attempt, max_delay)`. With jitter enabled a
/// uniform random 0..10% of that delay is added on top.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let exponential = config.base_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    let capped_delay = if exponential.is_finite() {
        (exponential as u64).min(config.max_delay_ms)
    } else {
        config.max_delay_ms
    };

    let jitter_range = capped_delay / 10;
    let jitter = if config.jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Sum of all jitter-free delays a fully exhausted retry sequence sleeps.
pub fn total_backoff(config: &RetryConfig) -> Duration {
    let plain = RetryConfig {
        jitter: false,
        ..config.clone()
    };
    (0..config.max_attempts)
        .map(|attempt| calculate_backoff(attempt, &plain))
        .sum()
}
