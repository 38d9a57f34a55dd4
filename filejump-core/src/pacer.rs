use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::FileJumpError;

pub const DEFAULT_MIN_SLEEP: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    /// Exponential delay for `attempt` (0-based). With jitter the result is
    /// drawn from `base..=exp`, so it never drops below the minimum sleep.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter && exp > base_ms {
            rng.gen_range(base_ms..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }
}

/// Wraps every API call with the retry predicate, backoff and cancellation.
#[derive(Debug, Clone)]
pub struct Pacer {
    backoff: Backoff,
    max_attempts: u32,
    cancel: CancellationToken,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SLEEP, DEFAULT_MAX_SLEEP, DEFAULT_MAX_ATTEMPTS)
    }
}

impl Pacer {
    pub fn new(min_sleep: Duration, max_sleep: Duration, max_attempts: u32) -> Self {
        Self {
            backoff: Backoff::new(min_sleep, max_sleep, true),
            max_attempts: max_attempts.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, runs
    /// out of attempts or the pacer is cancelled.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, FileJumpError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FileJumpError>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FileJumpError::Cancelled);
            }
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FileJumpError::Cancelled),
                result = op() => result,
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }
            // Server hints are capped at the max sleep.
            let delay = err
                .retry_after()
                .map(|after| after.min(self.backoff.max))
                .unwrap_or_else(|| self.backoff.delay(attempt - 1));
            tracing::debug!(attempt, ?delay, error = %err, "retrying request");
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FileJumpError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs `op` once under the pacer's cancellation, for calls whose body
    /// cannot be replayed.
    pub async fn call_once<T, Fut>(&self, op: Fut) -> Result<T, FileJumpError>
    where
        Fut: Future<Output = Result<T, FileJumpError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(FileJumpError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FileJumpError::Cancelled),
            result = op => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> FileJumpError {
        FileJumpError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
            www_authenticate: None,
            retry_after: None,
        }
    }

    fn fast_pacer(attempts: u32) -> Pacer {
        Pacer::new(Duration::from_millis(1), Duration::from_millis(2), attempts)
    }

    #[test]
    fn backoff_without_jitter_is_exponential() {
        let backoff = Backoff::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            false,
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            backoff.delay_with_rng(0, &mut rng),
            Duration::from_millis(100)
        );
        assert_eq!(
            backoff.delay_with_rng(1, &mut rng),
            Duration::from_millis(200)
        );
        assert_eq!(
            backoff.delay_with_rng(2, &mut rng),
            Duration::from_millis(400)
        );
        assert_eq!(
            backoff.delay_with_rng(3, &mut rng),
            Duration::from_millis(800)
        );
        assert_eq!(
            backoff.delay_with_rng(4, &mut rng),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn backoff_with_jitter_stays_between_min_and_max() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800), true);
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..8 {
            let delay = backoff.delay_with_rng(attempt, &mut rng);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let value = fast_pacer(5)
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(transient()) } else { Ok(n) } }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_after_is_capped_at_max_sleep() {
        let calls = AtomicU32::new(0);
        let pacer = fast_pacer(2);
        let op = pacer.call(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FileJumpError::Api {
                        status: StatusCode::TOO_MANY_REQUESTS,
                        body: String::new(),
                        www_authenticate: None,
                        retry_after: Some(Duration::from_secs(86_400)),
                    })
                } else {
                    Ok(n)
                }
            }
        });
        let value = tokio::time::timeout(Duration::from_secs(5), op)
            .await
            .expect("retry should not wait for the full Retry-After")
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast_pacer(3)
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FileJumpError::Api { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast_pacer(5)
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(FileJumpError::Api {
                        status: StatusCode::NOT_FOUND,
                        body: String::new(),
                        www_authenticate: None,
                        retry_after: None,
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_pacer_makes_no_calls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pacer = fast_pacer(5).with_cancellation(cancel);
        let calls = AtomicU32::new(0);
        let err = pacer
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, FileJumpError>(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FileJumpError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
