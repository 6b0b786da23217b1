//! Retry driver.
//!
//! # Responsibilities
//! - Re-invoke an attempt while its error is classified as retryable
//! - Sleep with exponential backoff between attempts
//! - Track the retry count on the request context
//!
//! # Design Decisions
//! - Non-retryable errors propagate after the first attempt
//! - Backoff sleeps are tokio timers; dropping the future cancels them
//! - `max_attempts` counts retries, so a call makes at most `max_attempts + 1` attempts
//! - A circuit that opens mid-sequence stops further retries; the last upstream error is returned

use std::future::Future;

use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::context::RequestContext;
use crate::resilience::error::{ClientError, ClientResult};

/// Run `operation` until it succeeds, fails terminally, or the policy is exhausted.
///
/// `operation` receives the current retry count (0 for the first attempt).
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryConfig,
    ctx: &mut RequestContext,
    operation: F,
) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    retry_with_backoff_while(policy, ctx, || true, operation).await
}

/// Like [`retry_with_backoff`], but gives up early once `keep_retrying` returns false.
///
/// Either way the caller gets the last real failure. A retry rejected by an open
/// circuit surfaces the error that prompted the retry, not the rejection.
pub async fn retry_with_backoff_while<T, F, Fut, G>(
    policy: &RetryConfig,
    ctx: &mut RequestContext,
    keep_retrying: G,
    mut operation: F,
) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
    G: Fn() -> bool,
{
    let mut attempt: u32 = 0;
    let mut last_err: Option<ClientError> = None;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(rejected @ ClientError::CircuitOpen { .. }) => {
                return match last_err {
                    Some(err) => {
                        ctx.retry_count = attempt.saturating_sub(1);
                        Err(err)
                    }
                    None => Err(rejected),
                };
            }
            Err(err) => {
                if !err.should_retry() || attempt >= policy.max_attempts {
                    return Err(err);
                }
                if !keep_retrying() {
                    tracing::warn!(
                        request_id = %ctx.id,
                        upstream = %ctx.target,
                        attempt = attempt + 1,
                        error = %err,
                        "Retries abandoned, circuit opened"
                    );
                    return Err(err);
                }

                let delay = calculate_backoff(attempt, policy);
                tracing::info!(
                    request_id = %ctx.id,
                    upstream = %ctx.target,
                    attempt = attempt + 1,
                    delay = ?delay,
                    error = %err,
                    "Retrying request"
                );
                metrics::record_retry(&ctx.target);
                sleep(delay).await;

                last_err = Some(err);
                attempt += 1;
                ctx.retry_count = attempt;
            }
        }
    }
}
