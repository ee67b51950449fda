// ABOUTME: Caller-side retry with exponential backoff for infrastructure failures.
// ABOUTME: Only errors whose kind is retryable are retried; decisions are surfaced at once.

use std::future::Future;
use std::time::Duration;

use crate::error::ErrorKind;

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub retries: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            initial: Duration::from_millis(200),
            max: Duration::from_secs(10),
        }
    }

    pub fn initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retries are used up. `kind_of` classifies each error.
///
/// The whole operation is re-run on each attempt, so a promotion that lost a
/// ledger race re-reads the current state before deciding again.
pub async fn with_backoff<T, E, F, Fut, K>(
    backoff: Backoff,
    kind_of: K,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    K: Fn(&E) -> Option<ErrorKind>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = kind_of(&e).is_some_and(ErrorKind::is_retryable);
                if !retryable || attempt >= backoff.retries {
                    return Err(e);
                }
                attempt += 1;
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    attempt,
                    retries = backoff.retries,
                    "retrying in {:?} after: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
