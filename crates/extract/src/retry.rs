use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Exponential backoff for a single external call that failed in transit.
///
/// This is separate from the attempt budget of the extractor: a call retried
/// here is still one attempt from the extractor's point of view.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 1000, 10000)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Backoff before retry number `retry` (zero-based): doubles from the
    /// initial delay and never exceeds the cap.
    pub fn delay(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `f` until it succeeds, fails with an error `is_transient` rejects,
    /// or the retry budget is spent. The last error is returned as is.
    pub async fn retry<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        is_transient: P,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut retries = 0;

        loop {
            let error = match f().await {
                Ok(result) => {
                    if retries > 0 {
                        info!(operation = operation_name, retries, "Call succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !is_transient(&error) {
                debug!(operation = operation_name, error = %error, "Permanent failure, not retrying");
                return Err(error);
            }
            if retries >= self.max_retries {
                warn!(operation = operation_name, retries, error = %error, "Retry budget spent");
                return Err(error);
            }

            let wait = self.delay(retries);
            warn!(
                operation = operation_name,
                retry = retries + 1,
                max_retries = self.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "Transient failure, backing off"
            );
            sleep(wait).await;
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, 1, 2);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<&str, String> = policy
            .retry("flaky", |_| true, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, 1, 1);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), String> = policy
            .retry("down", |_| true, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("timeout".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_none_does_not_retry() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), String> = RetryPolicy::none()
            .retry("once", |_| true, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_at_once() {
        let policy = RetryPolicy::new(5, 1, 1);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), String> = policy
            .retry("rejected", |e: &String| !e.starts_with("400"), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("400 Bad Request".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "400 Bad Request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_then_permanent_stops_early() {
        let policy = RetryPolicy::new(5, 1, 1);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), String> = policy
            .retry("mixed", |e: &String| e.starts_with("503"), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("503 Service Unavailable".to_string())
                } else {
                    Err("401 Unauthorized".to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "401 Unauthorized");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(10, 100, 1000);

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1000));
        assert_eq!(policy.delay(64), Duration::from_millis(1000));
    }
}
