use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{error, warn};

/// Boxed future returned by operations that borrow a mutable context.
pub type GuardFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Longest single backoff sleep, whatever the policy's curve says.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Attempt budget and backoff curve for `retry_with_backoff`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    /// Same backoff curve, but only a single retry after the first failure.
    pub fn single_retry(&self) -> Self {
        Self {
            max_attempts: 2,
            ..*self
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based):
    /// `initial_delay * factor^(attempt - 1)`, capped at `MAX_DELAY`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scale = self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * scale)
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Attempt counter shared by both retry loops.
struct Backoff<'p> {
    policy: &'p RetryPolicy,
    label: &'p str,
    attempt: u32,
}

impl<'p> Backoff<'p> {
    fn new(policy: &'p RetryPolicy, label: &'p str) -> Self {
        Self {
            policy,
            label,
            attempt: 0,
        }
    }

    /// Records a failed attempt. Hands the error back when it is final,
    /// otherwise sleeps out the backoff delay.
    async fn on_failure<E: Display>(&mut self, err: E, retryable: bool) -> Result<(), E> {
        self.attempt += 1;
        let (attempt, label) = (self.attempt, self.label);
        let max_attempts = self.policy.attempts();
        if !retryable {
            return Err(err);
        }
        if attempt >= max_attempts {
            error!("{label} failed after {max_attempts} attempts. Final error: {err}");
            return Err(err);
        }
        let delay = self.policy.delay_after(attempt);
        warn!(
            "Attempt {attempt} failed for {label}, retrying in {}ms: {err}",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy's attempt budget is spent. The last error is returned
/// unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut backoff = Backoff::new(policy, label);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = is_retryable(&e);
                backoff.on_failure(e, retryable).await?;
            }
        }
    }
}

/// Variant of `retry_with_backoff` for operations that need exclusive access
/// to a context (a site adapter, a session) on every attempt.
pub async fn retry_with_backoff_on<C, T, E, F, P>(
    ctx: &mut C,
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    C: ?Sized,
    F: for<'a> FnMut(&'a mut C) -> GuardFuture<'a, Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut backoff = Backoff::new(policy, label);
    loop {
        match op(ctx).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = is_retryable(&e);
                backoff.on_failure(e, retryable).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Flaky {
        Stale(u32),
        Fatal,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Flaky::Stale(n) => write!(f, "stale #{n}"),
                Flaky::Fatal => write!(f, "fatal"),
            }
        }
    }

    #[test]
    fn test_default_policy_matches_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert!((policy.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_grows_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_huge_backoff_is_capped_instead_of_overflowing() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 1e20);
        assert_eq!(policy.delay_after(2), MAX_DELAY);
        assert_eq!(policy.delay_after(u32::MAX), MAX_DELAY);

        let nan = RetryPolicy::new(3, Duration::from_secs(1), f64::NAN);
        assert_eq!(nan.delay_after(2), Duration::ZERO);

        let immediate = RetryPolicy::new(3, Duration::ZERO, f64::INFINITY);
        assert_eq!(immediate.delay_after(3), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_runs_max_attempts_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let result: Result<(), Flaky> = retry_with_backoff(
            &RetryPolicy::default(),
            "always_fails",
            |_| true,
            || {
                let calls = calls.clone();
                let stamps = stamps.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    stamps.lock().unwrap().push(started.elapsed());
                    Err(Flaky::Stale(n))
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(Flaky::Stale(3)));

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 2);
        let tolerance = Duration::from_millis(50);
        assert!(gaps[0] >= Duration::from_secs(1) && gaps[0] < Duration::from_secs(1) + tolerance);
        assert!(gaps[1] >= Duration::from_secs(2) && gaps[1] < Duration::from_secs(2) + tolerance);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), Flaky> = retry_with_backoff(
            &RetryPolicy::default(),
            "fatal_op",
            |e| matches!(e, Flaky::Stale(_)),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Flaky::Fatal)
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(Flaky::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, Flaky> = retry_with_backoff(
            &RetryPolicy::default(),
            "flaky_op",
            |_| true,
            || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 {
                        Err(Flaky::Stale(n))
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(2));
    }

    struct Counter {
        hits: u32,
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_variant_mutates_context_each_attempt() {
        let mut counter = Counter { hits: 0 };

        let result: Result<u32, Flaky> = retry_with_backoff_on(
            &mut counter,
            &RetryPolicy::default().single_retry(),
            "context_op",
            |_| true,
            |c| {
                Box::pin(async move {
                    c.hits += 1;
                    Err(Flaky::Stale(c.hits))
                })
            },
        )
        .await;

        assert_eq!(counter.hits, 2);
        assert_eq!(result, Err(Flaky::Stale(2)));
    }
}
