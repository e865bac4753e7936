// src/error_recovery.rs
//! Retry with linear backoff for image fetches.

use crate::config::RetryPolicy;
use crate::error::FetchError;

/// Retries an async operation until it succeeds or the policy's attempt budget is spent.
///
/// The wait before attempt `n` grows linearly (`base_delay * (n - 1)`), which
/// keeps the worst-case total wait predictable. Every failed attempt is
/// logged with its number; exhaustion yields [`FetchError::Exhausted`]
/// wrapping the last failure.
pub async fn retry_with_backoff<F, T, Fut>(
    label: &str,
    mut operation: F,
    policy: &RetryPolicy,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts();
    let mut last_error = FetchError::Transport("no attempt was made".to_string());

    for attempt in 1..=attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    log::debug!("{} succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(result);
            }
            Err(e) => {
                log::warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, label, e);
                let retryable = e.is_retryable();
                last_error = e;
                if !retryable {
                    break;
                }
            }
        }
    }

    Err(FetchError::Exhausted {
        url: label.to_string(),
        attempts,
        last: Box::new(last_error),
    })
}
