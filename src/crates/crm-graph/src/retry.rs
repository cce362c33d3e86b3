//! Exponential backoff retry for node execution.
//!
//! This is deliberately a smaller sibling of `crm_gateway`'s retry/circuit-breaker
//! stack: it retries a *node's own* transient failure (e.g. a flaky internal
//! lookup), not CRM calls, which already go through the effect runner's own
//! retry layer before a node ever sees their result. A node that wants
//! automatic retry wraps its fallible body in `RetryPolicy::execute`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with jitter, mirroring the constants the effect
/// runner uses for CRM calls so behavior is easy to reason about across the
/// codebase even though the two retry stacks are independent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let millis = if self.jitter {
            let mut rng = rand::thread_rng();
            let jitter_factor = rng.gen_range(0.5..1.0);
            capped * jitter_factor
        } else {
            capped
        };
        Duration::from_secs_f64(millis.max(0.0))
    }

    /// Run `f` up to `max_retries + 1` times, retrying while `is_retryable`
    /// returns true for the error and attempts remain. Returns the last error
    /// once attempts are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, is_retryable: impl Fn(&E) -> bool, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying node execution");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
            ..RetryPolicy::new(5)
        };
        let attempts = AtomicU32::new(0);

        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| true,
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient")
                        } else {
                            Ok(42)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::new(5)
        };
        let attempts = AtomicU32::new(0);

        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| false,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal") }
                },
            )
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_retries() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryPolicy::new(2)
        };
        let attempts = AtomicU32::new(0);

        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| true,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("still failing") }
                },
            )
            .await;

        assert_eq!(result, Err("still failing"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
