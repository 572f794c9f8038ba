use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum GuardError {
    #[error("operation exceeded its {}s bound", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Caps an async operation at `bound`.
///
/// On expiry the future is dropped at its current await point, so anything
/// it owns is released with it.
pub async fn run_bounded<F>(bound: Duration, fut: F) -> Result<F::Output, GuardError>
where
    F: Future,
{
    tokio::time::timeout(bound, fut).await.map_err(|_| {
        warn!("Operation timed out after {}s", bound.as_secs_f64());
        GuardError::TimedOut(bound)
    })
}

/// Caps a blocking closure at `bound`.
///
/// The closure runs on the blocking pool. A blocking call cannot be
/// interrupted, so on timeout it keeps running detached and its result is
/// discarded; the closure must not share mutable state with the caller.
pub async fn run_blocking_bounded<T, F>(bound: Duration, f: F) -> Result<T, GuardError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(bound, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(GuardError::Join(join_error.to_string())),
        Err(_) => {
            warn!(
                "Blocking operation exceeded {}s; abandoning it in the background",
                bound.as_secs_f64()
            );
            Err(GuardError::TimedOut(bound))
        }
    }
}

/// Cooperative wall-clock budget, polled between units of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    bound: Duration,
}

impl Deadline {
    pub fn after(bound: Duration) -> Self {
        Self {
            started: Instant::now(),
            bound,
        }
    }

    pub fn bound(&self) -> Duration {
        self.bound
    }

    pub fn remaining(&self) -> Duration {
        self.bound.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.bound
    }

    pub fn check(&self) -> Result<(), GuardError> {
        if self.is_expired() {
            Err(GuardError::TimedOut(self.bound))
        } else {
            Ok(())
        }
    }
}
