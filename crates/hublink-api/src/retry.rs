//! Reusable retry policy.
//!
//! One type, two delay curves: the socket reconnect loop grows linearly
//! and caps at a multiple of the base interval, while REST calls double
//! on every attempt. Both are expressed as a [`Backoff`] so callers can't
//! accidentally swap one formula for the other.

use std::future::Future;
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * min(attempt, cap)`. Attempt 0 waits nothing.
    LinearCapped { base: Duration, cap: u32 },
    /// `base * 2^attempt`.
    Exponential { base: Duration },
}

impl Backoff {
    /// Delay to wait before the retry that follows `attempt` prior failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::LinearCapped { base, cap } => base.saturating_mul(attempt.min(cap)),
            Self::Exponential { base } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

/// Attempt budget plus delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Multiplier cap for the reconnect curve.
    pub const RECONNECT_CAP: u32 = 5;

    /// Reconnect policy: `interval * min(counter, 5)`, at most `max_attempts` retries.
    pub fn linear_capped(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::LinearCapped {
                base: interval,
                cap: Self::RECONNECT_CAP,
            },
        }
    }

    /// REST policy: `base * 2^attempt`, at most `max_attempts` tries in total.
    pub fn exponential(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base },
        }
    }

    /// Whether another attempt fits in the budget after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget runs out. `op` receives the zero-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let next = attempt + 1;
                    if !is_retryable(&e) || !self.allows(next) {
                        return Err(e);
                    }
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn reconnect_delay_grows_linearly_and_caps() {
        let policy = RetryPolicy::linear_capped(Duration::from_millis(5000), 10);

        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_millis(5000));
        assert_eq!(policy.delay(4), Duration::from_millis(20_000));
        assert_eq!(policy.delay(5), Duration::from_millis(25_000));
        assert_eq!(policy.delay(6), Duration::from_millis(25_000));
        assert_eq!(policy.delay(50), Duration::from_millis(25_000));
    }

    #[test]
    fn rest_delay_doubles() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), 3);

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn exponential_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), 3);
        assert!(policy.delay(40) >= Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn budget_check() {
        let policy = RetryPolicy::linear_capped(Duration::from_secs(1), 2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(Duration::from_millis(10), 3);

        let result: Result<u32, &str> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { if attempt < 2 { Err("flaky") } else { Ok(attempt) } }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(Duration::from_millis(10), 5);

        let result: Result<(), &str> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("rejected") }
                },
                |_| false,
            )
            .await;

        assert_eq!(result, Err("rejected"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(Duration::from_millis(10), 3);

        let result: Result<(), &str> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
