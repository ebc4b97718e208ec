//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff step
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Retry an async operation up to `max_attempts` times
///
/// Backoff starts at `initial_backoff` and doubles per attempt, capped at
/// two seconds. `max_attempts` of 0 is treated as 1. Returns the last
/// error when every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if attempt < max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(err) => {
                if max_attempts > 1 {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed: attempts exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}
