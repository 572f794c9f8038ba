//! Job Source Adapter contract.
//!
//! Each job site implements `JobSource`. Selectors, waits and DOM quirks
//! stay inside the implementation; the traversal engine only sees form
//! step snapshots and a handful of interactions.

pub mod recorded;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::Credentials;
use crate::cookies::Cookie;
use crate::errors::AppError;
use crate::form::{FieldId, StepControl, StepState};
use crate::models::JobRef;

#[async_trait]
pub trait JobSource: Send {
    /// Site key, e.g. `linkedin`.
    fn site(&self) -> &str;

    async fn is_logged_in(&mut self) -> bool;

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AppError>;

    /// Cookies of the current browser session.
    async fn cookies(&mut self) -> Result<Vec<Cookie>, AppError>;

    async fn restore_cookies(&mut self, cookies: &[Cookie]) -> Result<(), AppError>;

    /// Candidate postings reachable from `seed`, in the order the site lists
    /// them. A seed may be a search page or a single posting.
    async fn discover_candidates(&mut self, seed: &str) -> Result<Vec<JobRef>, AppError>;

    /// Opens the application wizard for `job` on its first step.
    async fn open_application(&mut self, job: &JobRef) -> Result<(), AppError>;

    /// Fresh snapshot of the step on screen.
    async fn current_step(&mut self) -> Result<StepState, AppError>;

    /// Replaces the field's text.
    async fn set_text(&mut self, field: &FieldId, value: &str) -> Result<(), AppError>;

    /// Selects the option whose text or value equals `option`. Returns
    /// `false` when no such option exists.
    async fn select_option(&mut self, field: &FieldId, option: &str) -> Result<bool, AppError>;

    /// Checks every box of a checkbox group.
    async fn check_all(&mut self, field: &FieldId) -> Result<(), AppError>;

    /// Client-side validation message currently shown for the field.
    async fn validation_error(&mut self, field: &FieldId) -> Result<Option<String>, AppError>;

    /// Activates the step's leaving control (next / review).
    async fn advance(&mut self, control: StepControl) -> Result<(), AppError>;

    /// Walks back to the first step, keeping entered values.
    async fn rewind(&mut self) -> Result<(), AppError>;

    async fn submit(&mut self) -> Result<(), AppError>;

    /// Dismisses the wizard, whatever state it is in.
    async fn close_application(&mut self) -> Result<(), AppError>;
}

/// Maps seed URLs to site keys by host.
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    /// (host suffix, site key), checked in order.
    hosts: Vec<(String, String)>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self {
            hosts: vec![
                ("linkedin.com".to_string(), "linkedin".to_string()),
                ("microsoft.com".to_string(), "microsoft".to_string()),
            ],
        }
    }
}

impl SiteRegistry {
    pub fn register(&mut self, host: impl Into<String>, site: impl Into<String>) {
        self.hosts.insert(0, (host.into().to_lowercase(), site.into()));
    }

    /// Site key for a seed. Bare hosts such as `linkedin.com` are accepted.
    pub fn site_for(&self, seed: &str) -> Result<&str, AppError> {
        let host = host_of(seed)
            .ok_or_else(|| AppError::Application(format!("Unparseable job URL: {seed}")))?;

        self.hosts
            .iter()
            .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{suffix}")))
            .map(|(_, site)| site.as_str())
            .ok_or_else(|| AppError::Application(format!("Unsupported job site: {host}")))
    }
}

fn host_of(seed: &str) -> Option<String> {
    let seed = seed.trim();
    let with_scheme = if seed.contains("://") {
        seed.to_string()
    } else {
        format!("https://{seed}")
    };
    Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
}
