use thiserror::Error;

use crate::guards::GuardError;

/// Application-level error type.
///
/// Variants follow how far a failure is allowed to travel: transient
/// interaction errors stay inside the traversal engine, resolution errors
/// degrade to fallback answers, timeouts and application errors end the
/// current job only. `Browser` is the one variant that ends the run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Element not rendered yet: {0}")]
    NotRendered(String),

    #[error("Answer resolution failed: {0}")]
    Resolution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Application error: {0}")]
    Application(String),

    #[error("Browser session error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Transient interaction errors are recovered by re-querying the current
    /// step; everything else propagates.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::StaleElement(_) | AppError::NotRendered(_))
    }

    /// Errors that must stop the whole run rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Browser(_))
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::TimedOut(_) => AppError::Timeout(err.to_string()),
            GuardError::Join(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}
