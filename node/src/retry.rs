//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};
use waypost_engine::BackoffPolicy;

/// Run `f` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent.
///
/// `f` receives the 1-based attempt number. After the n-th retryable failure
/// the combinator sleeps `policy.delay_after(n)` before trying again; no
/// sleep follows the final attempt. The last error is returned on
/// exhaustion.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &BackoffPolicy,
    operation: &str,
    mut f: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay_ms = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
