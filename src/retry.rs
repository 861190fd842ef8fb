//! Bounded exponential-backoff executor used for every remote write.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retries after the first attempt.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy: `max_attempts` retries after the first try, delays doubling
/// from `initial_delay`, no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

/// Per-call retry bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_remaining: u32,
    pub next_delay: Duration,
}

impl RetryState {
    /// Consume one retry. Returns the delay to wait before it, or `None`
    /// when no retries remain.
    fn advance(&mut self) -> Option<Duration> {
        if self.attempts_remaining == 0 {
            return None;
        }
        let delay = self.next_delay;
        self.attempts_remaining -= 1;
        self.next_delay = self.next_delay.saturating_mul(2);
        Some(delay)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Policy that tries exactly once.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Total number of tries, first try included.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// The delays slept between attempts when every attempt fails.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut state = self.initial_state();
        std::iter::from_fn(|| state.advance()).collect()
    }

    fn initial_state(&self) -> RetryState {
        RetryState {
            attempts_remaining: self.max_attempts,
            next_delay: self.initial_delay,
        }
    }

    /// Run `operation` until it succeeds or retries are exhausted.
    ///
    /// The last failure is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_as("operation", operation).await
    }

    /// Same as [`execute`](Self::execute), tagging log events with `label`.
    pub async fn execute_as<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut state = self.initial_state();
        let mut attempt = 1u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match state.advance() {
                Some(delay) => {
                    debug!(
                        op = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(op = label, attempts = attempt, error = %error, "retries exhausted");
                    return Err(error);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY)
    }
}
