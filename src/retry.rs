//! Bounded retries with exponential backoff around a single upstream call.

use crate::llm::UpstreamError;
use std::future::Future;
use std::time::Duration;

pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

/// One finished attempt, as reported to the caller's observer.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// Counted from 1
    pub attempt: u32,
    /// None if the attempt succeeded
    pub error: Option<&'a UpstreamError>,
    /// Set only if another attempt will follow
    pub delay_before_next: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("non-retryable failure on attempt {attempt}: {source}")]
    Fatal { attempt: u32, source: UpstreamError },
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// A `max_attempts` of zero still runs the operation once.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the attempt following attempt number `attempt`: `base_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or runs out of
    /// attempts.  `observer` sees every attempt.
    pub async fn execute<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut observer: O,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
        O: FnMut(&RetryAttempt<'_>),
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    observer(&RetryAttempt {
                        attempt,
                        error: None,
                        delay_before_next: None,
                    });
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                observer(&RetryAttempt {
                    attempt,
                    error: Some(&error),
                    delay_before_next: None,
                });
                return Err(RetryError::Fatal {
                    attempt,
                    source: error,
                });
            }

            if attempt >= self.max_attempts {
                observer(&RetryAttempt {
                    attempt,
                    error: Some(&error),
                    delay_before_next: None,
                });
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff(attempt);
            observer(&RetryAttempt {
                attempt,
                error: Some(&error),
                delay_before_next: Some(delay),
            });

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
