//! Bounded retry for transient backend failures.

use crate::config::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS};
use crate::error::{DaoError, DaoResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the total is `max_retries + 1`.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_COUNT,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `attempt` until it succeeds, fails fatally, or the budget runs out.
    ///
    /// Only `DaoError::Backend` failures are classified here. Transient ones are retried
    /// after a blocking sleep; once the budget is spent they surface as
    /// `TransientRetryExhausted` wrapping the last cause. Fatal ones become `FatalQuery`
    /// at once. Every other error passes through untouched.
    pub fn run<T, F>(&self, label: &str, mut attempt: F) -> DaoResult<T>
    where
        F: FnMut() -> DaoResult<T>,
    {
        let mut remaining = self.max_retries;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match attempt() {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation = label, attempts, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(DaoError::Backend(cause)) if cause.is_transient() => {
                    if remaining == 0 {
                        return Err(DaoError::TransientRetryExhausted {
                            operation: label.to_string(),
                            attempts,
                            source: cause,
                        });
                    }
                    warn!(
                        operation = label,
                        attempt = attempts,
                        remaining,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %cause,
                        "Transient failure, retrying"
                    );
                    std::thread::sleep(self.delay);
                    remaining -= 1;
                }
                Err(DaoError::Backend(cause)) => {
                    return Err(DaoError::fatal_backend(
                        format!("Error in {}: {}", label, cause),
                        cause,
                    ));
                }
                Err(other) => return Err(other),
            }
        }
    }
}
