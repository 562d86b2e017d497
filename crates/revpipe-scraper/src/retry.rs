//! Bounded exponential-backoff retry for scraper HTTP calls.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

impl ScraperError {
    /// Network failures, 429s and 5xx responses. Anything else would fail
    /// the same way on a second call.
    fn is_transient(&self) -> bool {
        match self {
            ScraperError::RateLimited { .. } | ScraperError::Http(_) => true,
            ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
            ScraperError::Deserialize { .. }
            | ScraperError::EmptyBody { .. }
            | ScraperError::InvalidUrl { .. } => false,
        }
    }
}

/// Wait before retry `retry` (0-based): `base * 2^retry`, or the server's
/// `Retry-After` when that is longer.
fn backoff_secs(err: &ScraperError, base_secs: u64, retry: u32) -> u64 {
    if let ScraperError::RateLimited { retry_after_secs } = err {
        return (*retry_after_secs).max(base_secs);
    }
    base_secs.saturating_mul(2u64.saturating_pow(retry))
}

/// Runs `request` until it succeeds, fails permanently, or has been retried
/// `max_retries` times.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut request: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut retries = 0u32;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retries < max_retries => {
                let wait = backoff_secs(&err, backoff_base_secs, retries);
                tracing::warn!(
                    retry = retries + 1,
                    max_retries,
                    wait_secs = wait,
                    error = %err,
                    "scraper: transient failure, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                retries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
