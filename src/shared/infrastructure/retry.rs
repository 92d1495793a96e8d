// Explicit retry and polling primitives.
//
// Purpose
// - Bounded retry with a backoff schedule, and polling until a condition holds or time runs out.
//
// Boundaries
// - Retries wrap idempotent reads against the external calendar only. Writes that create
//   external state are never retried blindly.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::warn;

/// Bounded retry with a fixed backoff schedule.
///
/// `backoff[i]` is the pause after failed attempt `i + 1`; the last entry repeats when the
/// schedule is shorter than `max_attempts - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Vec::new(),
        }
    }

    /// `base`, `2 * base`, `4 * base`, ... for `max_attempts - 1` pauses.
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        let max_attempts = max_attempts.max(1);
        let backoff = (0..max_attempts.saturating_sub(1))
            .map(|i| base.saturating_mul(1u32 << i.min(16)))
            .collect();
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Runs `operation` until it succeeds or the attempts are used up. The closure receives the
    /// 1-based attempt number. The last error is returned unchanged.
    pub async fn run<F, Fut, T, E>(&self, what: &str, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(what, operation, |_| true).await
    }

    /// Like `run`, but errors for which `retryable` is false are returned at once.
    pub async fn run_if<F, Fut, T, E, R>(
        &self,
        what: &str,
        mut operation: F,
        retryable: R,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts && retryable(&error) => {
                    let delay = self.delay_after(attempt);
                    warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %error, "attempt failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Polls `check` every `interval` until it reports true or `timeout` elapses.
/// Returns whether the condition was met.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}
