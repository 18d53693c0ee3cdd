use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Retry; a server-provided `hint` replaces the computed backoff.
    Retry { hint: Option<Duration> },
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the retry ceiling was reached.
    AttemptsExceeded { error: E, retries: u32 },
}

/// Bounded exponential backoff: `base * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&engine_config::settings::RateLimitSettings> for RetryPolicy {
    fn from(settings: &engine_config::settings::RateLimitSettings) -> Self {
        Self::new(settings.max_retries, settings.base_delay, settings.max_delay)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Executes the operation, sleeping between retryable failures.
    ///
    /// At most `max_retries` retries follow the first attempt.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut retries = 0u32;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => match classify(&err) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                    RetryDisposition::Retry { hint } => {
                        if retries >= self.max_retries {
                            return Err(RetryError::AttemptsExceeded {
                                error: err,
                                retries,
                            });
                        }

                        let delay = self.delay_for(retries, hint);
                        warn!(
                            retry = retries + 1,
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            hinted = hint.is_some(),
                            "Backing off before retry"
                        );
                        sleep(delay).await;
                        retries += 1;
                    }
                },
            }
        }
    }

    /// Delay before retry number `retry + 1`. A hint is honored as given.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << retry.min(16);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
