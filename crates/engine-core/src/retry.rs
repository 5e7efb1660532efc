use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal { error: E, attempts: usize },
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded { error: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::AttemptsExceeded { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::AttemptsExceeded { error, .. } => error,
        }
    }
}

/// A successful value together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Policy without sleeps between attempts, for tests and dry runs.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => match classify(&error) {
                    RetryDisposition::Stop => {
                        return Err(RetryError::Fatal {
                            error,
                            attempts: attempt + 1,
                        });
                    }
                    RetryDisposition::Retry => {
                        if attempt + 1 >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded {
                                error,
                                attempts: attempt + 1,
                            });
                        }

                        let delay = self.backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying after failure"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let res = RetryPolicy::immediate(3)
            .run(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("boom")
                    } else {
                        Ok(7)
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await
            .unwrap();

        assert_eq!(res.value, 7);
        assert_eq!(res.attempts, 3);
    }

    #[tokio::test]
    async fn stops_on_fatal_and_on_exhaustion() {
        let res: Result<Attempted<()>, _> = RetryPolicy::immediate(3)
            .run(|| async { Err("bad") }, |_| RetryDisposition::Stop)
            .await;
        assert!(matches!(res, Err(RetryError::Fatal { attempts: 1, .. })));

        let res: Result<Attempted<()>, _> = RetryPolicy::immediate(3)
            .run(|| async { Err("flaky") }, |_| RetryDisposition::Retry)
            .await;
        let err = res.unwrap_err();
        assert!(matches!(err, RetryError::AttemptsExceeded { .. }));
        assert_eq!(err.attempts(), 3);
    }
}
