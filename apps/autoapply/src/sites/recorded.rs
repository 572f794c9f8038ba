//! RecordedSite: replays a captured application wizard from a JSON
//! fixture instead of driving a live browser.
//!
//! Used for dry runs (`FIXTURE_PATH`) and as the adapter behind the engine
//! and runner tests. It models the behaviour the engine has to cope with:
//! validation that blocks "next", fields that go stale once, values that
//! survive a rewind, and a login that can be satisfied from cookies.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::cookies::Cookie;
use crate::errors::AppError;
use crate::form::{FieldId, FormStep, StepControl, StepState};
use crate::models::JobRef;
use crate::sites::JobSource;

const SESSION_COOKIE: &str = "session";
const NUMERIC_MESSAGE: &str = "Enter a whole number between 0 and 99";
const DATE_MESSAGE: &str = "Enter a date in mm/dd/yyyy format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    Numeric,
    Date,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobFixture {
    pub job: JobRef,
    pub steps: Vec<FormStep>,
    #[serde(default)]
    pub rules: HashMap<FieldId, FieldRule>,
    /// Fields whose first interaction fails with a stale reference.
    #[serde(default)]
    pub stale_once: Vec<FieldId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteFixture {
    pub site: String,
    /// Host this fixture answers for, e.g. `fixture.local`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    pub jobs: Vec<JobFixture>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    SetText(String, String),
    Select(String, String),
    CheckAll(String),
    Advance,
    Rewind,
    Submit,
}

/// What happened during a replay, shared so callers can inspect it after
/// the adapter has been handed off.
#[derive(Debug, Default)]
pub struct Journal {
    pub interactions: Vec<Interaction>,
    pub opened: Vec<String>,
    pub submitted: Vec<String>,
    pub logins: u32,
}

struct ActiveApplication {
    job: usize,
    step: usize,
    values: HashMap<FieldId, String>,
}

pub struct RecordedSite {
    fixture: SiteFixture,
    logged_in: bool,
    active: Option<ActiveApplication>,
    stale_pending: HashMap<usize, Vec<FieldId>>,
    journal: Arc<Mutex<Journal>>,
}

impl RecordedSite {
    pub fn new(fixture: SiteFixture) -> Self {
        let stale_pending = fixture
            .jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (i, job.stale_once.clone()))
            .collect();
        Self {
            fixture,
            logged_in: false,
            active: None,
            stale_pending,
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let fixture: SiteFixture = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded recorded site '{}' with {} jobs from {}",
            fixture.site,
            fixture.jobs.len(),
            path.display()
        );
        Ok(Self::new(fixture))
    }

    pub fn host(&self) -> Option<&str> {
        self.fixture.host.as_deref()
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        self.journal.clone()
    }

    fn record(&self, interaction: Interaction) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.interactions.push(interaction);
        }
    }

    fn active(&self) -> Result<&ActiveApplication, AppError> {
        self.active
            .as_ref()
            .ok_or_else(|| AppError::Application("No application wizard is open".to_string()))
    }

    fn active_mut(&mut self) -> Result<&mut ActiveApplication, AppError> {
        self.active
            .as_mut()
            .ok_or_else(|| AppError::Application("No application wizard is open".to_string()))
    }

    fn snapshot(&self) -> Result<FormStep, AppError> {
        let active = self.active()?;
        let mut step = self.fixture.jobs[active.job].steps[active.step].clone();
        for field in &mut step.fields {
            if let Some(value) = active.values.get(&field.id) {
                field.value = Some(value.clone());
            }
        }
        Ok(step)
    }

    /// Fails once for fields listed in `stale_once`, then behaves.
    fn touch(&mut self, field: &FieldId) -> Result<(), AppError> {
        let job = self.active()?.job;
        if let Some(pending) = self.stale_pending.get_mut(&job) {
            if let Some(pos) = pending.iter().position(|f| f == field) {
                pending.remove(pos);
                return Err(AppError::StaleElement(field.to_string()));
            }
        }
        let step = self.snapshot()?;
        if step.fields.iter().any(|f| &f.id == field) {
            Ok(())
        } else {
            Err(AppError::NotRendered(field.to_string()))
        }
    }

    fn rule_message(&self, field: &FieldId, value: &str) -> Option<String> {
        let active = self.active.as_ref()?;
        match self.fixture.jobs[active.job].rules.get(field)? {
            FieldRule::Numeric if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) => {
                Some(NUMERIC_MESSAGE.to_string())
            }
            FieldRule::Date if NaiveDate::parse_from_str(value, "%m/%d/%Y").is_err() => {
                Some(DATE_MESSAGE.to_string())
            }
            _ => None,
        }
    }

    fn step_is_valid(&self, step: &FormStep) -> bool {
        step.fields.iter().filter(|f| f.required).all(|f| {
            let value = f.value.as_deref().unwrap_or("").trim();
            let placeholder = value.is_empty() || value.eq_ignore_ascii_case("select an option");
            !placeholder && self.rule_message(&f.id, value).is_none()
        })
    }
}

#[async_trait]
impl JobSource for RecordedSite {
    fn site(&self) -> &str {
        &self.fixture.site
    }

    async fn is_logged_in(&mut self) -> bool {
        self.logged_in
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AppError> {
        if let Ok(mut journal) = self.journal.lock() {
            journal.logins += 1;
        }
        let matches = |expected: &Option<String>, given: &str| {
            expected.as_deref().map_or(true, |expected| expected == given)
        };
        if !matches(&self.fixture.username, &credentials.username)
            || !matches(&self.fixture.password, &credentials.password)
        {
            return Err(AppError::Application("Login verification failed".to_string()));
        }
        self.logged_in = true;
        Ok(())
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, AppError> {
        if !self.logged_in {
            return Ok(Vec::new());
        }
        let token = self
            .fixture
            .session_token
            .clone()
            .unwrap_or_else(|| "recorded".to_string());
        Ok(vec![Cookie {
            domain: self.fixture.host.clone(),
            path: Some("/".to_string()),
            ..Cookie::new(SESSION_COOKIE, token)
        }])
    }

    async fn restore_cookies(&mut self, cookies: &[Cookie]) -> Result<(), AppError> {
        let expected = self.fixture.session_token.as_deref().unwrap_or("recorded");
        if cookies
            .iter()
            .any(|c| c.name == SESSION_COOKIE && c.value == expected)
        {
            self.logged_in = true;
        }
        Ok(())
    }

    async fn discover_candidates(&mut self, seed: &str) -> Result<Vec<JobRef>, AppError> {
        let submitted = self
            .journal
            .lock()
            .map(|j| j.submitted.clone())
            .unwrap_or_default();
        let direct = self.fixture.jobs.iter().any(|j| j.job.url == seed);

        Ok(self
            .fixture
            .jobs
            .iter()
            .map(|j| &j.job)
            .filter(|job| !direct || job.url == seed)
            .filter(|job| !submitted.contains(&job.url))
            .cloned()
            .collect())
    }

    async fn open_application(&mut self, job: &JobRef) -> Result<(), AppError> {
        let index = self
            .fixture
            .jobs
            .iter()
            .position(|j| j.job.url == job.url)
            .ok_or_else(|| AppError::Application(format!("No easy-apply form for {}", job.url)))?;
        if self.fixture.jobs[index].steps.is_empty() {
            return Err(AppError::Application(format!("Empty form for {}", job.url)));
        }
        self.active = Some(ActiveApplication {
            job: index,
            step: 0,
            values: HashMap::new(),
        });
        if let Ok(mut journal) = self.journal.lock() {
            journal.opened.push(job.url.clone());
        }
        Ok(())
    }

    async fn current_step(&mut self) -> Result<StepState, AppError> {
        match self.active {
            Some(_) => Ok(StepState::Step(self.snapshot()?)),
            None => Ok(StepState::Closed),
        }
    }

    async fn set_text(&mut self, field: &FieldId, value: &str) -> Result<(), AppError> {
        self.touch(field)?;
        self.active_mut()?
            .values
            .insert(field.clone(), value.to_string());
        self.record(Interaction::SetText(field.to_string(), value.to_string()));
        Ok(())
    }

    async fn select_option(&mut self, field: &FieldId, option: &str) -> Result<bool, AppError> {
        self.touch(field)?;
        let step = self.snapshot()?;
        let exists = step
            .fields
            .iter()
            .find(|f| &f.id == field)
            .is_some_and(|f| f.options.iter().any(|o| o == option));
        if !exists {
            return Ok(false);
        }
        self.active_mut()?
            .values
            .insert(field.clone(), option.to_string());
        self.record(Interaction::Select(field.to_string(), option.to_string()));
        Ok(true)
    }

    async fn check_all(&mut self, field: &FieldId) -> Result<(), AppError> {
        self.touch(field)?;
        let step = self.snapshot()?;
        let joined = step
            .fields
            .iter()
            .find(|f| &f.id == field)
            .map(|f| f.options.join(","))
            .unwrap_or_default();
        self.active_mut()?.values.insert(field.clone(), joined);
        self.record(Interaction::CheckAll(field.to_string()));
        Ok(())
    }

    async fn validation_error(&mut self, field: &FieldId) -> Result<Option<String>, AppError> {
        let value = self
            .active()?
            .values
            .get(field)
            .cloned()
            .unwrap_or_default();
        Ok(self.rule_message(field, value.trim()))
    }

    async fn advance(&mut self, control: StepControl) -> Result<(), AppError> {
        let step = self.snapshot()?;
        if step.control != control || control.is_submit() {
            return Err(AppError::NotRendered(format!("{control:?} control")));
        }
        self.record(Interaction::Advance);
        if !self.step_is_valid(&step) {
            debug!("Validation blocked advancing past step");
            return Ok(());
        }
        let active = self.active_mut()?;
        active.step += 1;
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), AppError> {
        self.active_mut()?.step = 0;
        self.record(Interaction::Rewind);
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), AppError> {
        let step = self.snapshot()?;
        if !step.control.is_submit() {
            return Err(AppError::NotRendered("Submit application button".to_string()));
        }
        if !self.step_is_valid(&step) {
            return Err(AppError::Application(
                "Submit rejected by form validation".to_string(),
            ));
        }
        let job = self.active()?.job;
        let url = self.fixture.jobs[job].job.url.clone();
        self.record(Interaction::Submit);
        if let Ok(mut journal) = self.journal.lock() {
            journal.submitted.push(url);
        }
        self.active = None;
        Ok(())
    }

    async fn close_application(&mut self) -> Result<(), AppError> {
        self.active = None;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_steps_advance_only_when_valid() {
        let mut site = RecordedSite::new(two_step_fixture());
        let job = site.discover_candidates("fixture.local").await.unwrap().remove(0);
        site.open_application(&job).await.unwrap();

        let years = FieldId::from("years");
        site.advance(StepControl::Next).await.unwrap();
        let StepState::Step(step) = site.current_step().await.unwrap() else {
            panic!("wizard should be open");
        };
        assert_eq!(step.fields[0].id, years, "empty required field blocks next");

        site.set_text(&years, "abc").await.unwrap();
        assert_eq!(
            site.validation_error(&years).await.unwrap().as_deref(),
            Some(NUMERIC_MESSAGE)
        );
        site.set_text(&years, "3").await.unwrap();
        assert_eq!(site.validation_error(&years).await.unwrap(), None);
        site.advance(StepControl::Next).await.unwrap();

        let StepState::Step(step) = site.current_step().await.unwrap() else {
            panic!("wizard should be open");
        };
        assert!(step.control.is_submit());
    }

    #[tokio::test]
    async fn test_values_survive_rewind() {
        let mut site = RecordedSite::new(two_step_fixture());
        let job = site.discover_candidates("fixture.local").await.unwrap().remove(0);
        site.open_application(&job).await.unwrap();
        site.set_text(&FieldId::from("years"), "7").await.unwrap();
        site.advance(StepControl::Next).await.unwrap();
        site.rewind().await.unwrap();

        let StepState::Step(step) = site.current_step().await.unwrap() else {
            panic!("wizard should be open");
        };
        assert_eq!(step.fields[0].value.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_stale_once_fails_first_touch_only() {
        let mut fixture = two_step_fixture();
        fixture.jobs[0].stale_once = vec![FieldId::from("years")];
        let mut site = RecordedSite::new(fixture);
        let job = site.discover_candidates("fixture.local").await.unwrap().remove(0);
        site.open_application(&job).await.unwrap();

        let years = FieldId::from("years");
        let first = site.set_text(&years, "3").await;
        assert!(matches!(first, Err(AppError::StaleElement(_))));
        assert!(site.set_text(&years, "3").await.is_ok());
    }

    #[tokio::test]
    async fn test_cookie_restore_logs_in() {
        let mut site = RecordedSite::new(two_step_fixture());
        assert!(!site.is_logged_in().await);
        site.restore_cookies(&[Cookie::new("session", "tok-1")]).await.unwrap();
        assert!(site.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_user() {
        let mut site = RecordedSite::new(two_step_fixture());
        let wrong = Credentials {
            username: "eve@example.com".to_string(),
            password: "pw".to_string(),
        };
        assert!(site.login(&wrong).await.is_err());
        let wrong_password = Credentials {
            password: "guess".to_string(),
            ..credentials()
        };
        assert!(site.login(&wrong_password).await.is_err());
        assert!(site.login(&credentials()).await.is_ok());
        assert_eq!(site.cookies().await.unwrap()[0].value, "tok-1");
    }

    #[tokio::test]
    async fn test_submitted_jobs_are_not_rediscovered() {
        let mut site = RecordedSite::new(two_step_fixture());
        let job = site.discover_candidates("fixture.local").await.unwrap().remove(0);
        site.open_application(&job).await.unwrap();
        site.set_text(&FieldId::from("years"), "3").await.unwrap();
        site.advance(StepControl::Next).await.unwrap();
        assert!(site.select_option(&FieldId::from("auth"), "Yes").await.unwrap());
        site.submit().await.unwrap();

        assert!(site.discover_candidates("fixture.local").await.unwrap().is_empty());
        assert_eq!(site.current_step().await.unwrap(), StepState::Closed);
    }
}
