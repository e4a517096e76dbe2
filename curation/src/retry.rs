//! Bounded retry with linear backoff around fallible operations.
//!
//! The delay between attempts grows linearly (`attempt × base_delay`) and is
//! issued through an injected [`Sleeper`], so exhaustion paths can be tested
//! without real-time sleeps. The final attempt's error is preserved intact
//! inside [`ExhaustedRetries`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Default maximum attempt count.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Injected delay mechanism.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Sleeper that returns immediately. Used in tests and dry runs.
#[derive(Debug, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _delay: Duration) {}
}

/// All attempts failed; carries the final attempt's error unchanged.
#[derive(Debug, thiserror::Error)]
#[error("operation '{label}' failed after {attempts} attempts: {source}")]
pub struct ExhaustedRetries<E: std::error::Error + 'static> {
    /// Operation label for diagnostics.
    pub label: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// The error from the final attempt.
    #[source]
    pub source: E,
}

impl<E: std::error::Error + 'static> ExhaustedRetries<E> {
    /// Unwrap back to the original error, discarding the retry envelope.
    pub fn into_source(self) -> E {
        self.source
    }
}

/// Bounded retry policy with linear backoff.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// Create a policy sleeping on the tokio timer.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Create a policy that never sleeps.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO).with_sleeper(Arc::new(NoopSleeper))
    }

    /// Replace the delay mechanism.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Either the operation's result is returned as-is, or every attempt
    /// failed and the last error comes back wrapped in [`ExhaustedRetries`].
    /// No partial results are surfaced.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ExhaustedRetries<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(ExhaustedRetries {
                        label: label.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.base_delay * attempt;
                    warn!(label, attempt, error = %err, delay_ms = delay.as_millis() as u64, "attempt failed, backing off");
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("boom {0}")]
    struct Boom(u32);

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    #[tokio::test]
    async fn test_success_passes_result_through() {
        let policy = RetryPolicy::no_delay(3);
        let result: Result<u32, ExhaustedRetries<Boom>> =
            policy.execute("op", || async { Ok(41) }).await;
        assert_eq!(result.unwrap(), 41);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy::no_delay(3);
        let calls = Mutex::new(0u32);
        let result = policy
            .execute("op", || async {
                let mut n = calls.lock().unwrap();
                *n += 1;
                if *n < 3 { Err(Boom(*n)) } else { Ok("done") }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_preserves_final_error() {
        let policy = RetryPolicy::no_delay(3);
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = policy
            .execute("op", || async {
                let mut n = calls.lock().unwrap();
                *n += 1;
                Err(Boom(*n))
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        // The last attempt's error comes back unchanged.
        assert_eq!(err.into_source().0, 3);
    }

    #[tokio::test]
    async fn test_backoff_grows_linearly() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy =
            RetryPolicy::new(4, Duration::from_millis(10)).with_sleeper(sleeper.clone());
        let _: Result<(), _> = policy.execute("op", || async { Err(Boom(0)) }).await;
        let delays = sleeper.delays.lock().unwrap().clone();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ]
        );
    }
}
