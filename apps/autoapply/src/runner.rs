//! Job queue and the application loop around the traversal engine.
//!
//! For each seed: pick the site adapter, make sure it is logged in, list
//! candidate postings, score them, and traverse the ones that pass the
//! gate. A failure on one seed or one posting is logged and the queue
//! moves on; only a fatal browser error ends the run.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Credentials;
use crate::cookies::CookieStore;
use crate::engine::FormTraversalEngine;
use crate::errors::AppError;
use crate::guards::{retry_with_backoff_on, run_bounded, RetryPolicy};
use crate::models::{ApplicationSession, FailureReason, Outcome};
use crate::resolution::{MatchGate, MatchScorer};
use crate::sites::{JobSource, SiteRegistry};

/// FIFO of seed URLs: search pages or single postings.
#[derive(Debug, Default)]
pub struct JobQueue {
    seeds: VecDeque<String>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a seed; blank seeds are ignored.
    pub fn push(&mut self, seed: impl AsRef<str>) {
        let seed = seed.as_ref().trim();
        if !seed.is_empty() {
            self.seeds.push_back(seed.to_string());
        }
    }

    /// Appends one seed per line of `path`. A missing or unreadable file is
    /// logged and adds nothing. Returns how many seeds were added.
    pub fn extend_from_file(&mut self, path: &Path) -> usize {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Could not read job seeds from {}: {e}", path.display());
                return 0;
            }
        };
        let before = self.seeds.len();
        raw.lines().for_each(|line| self.push(line));
        self.seeds.len() - before
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.seeds.pop_front()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

impl<S: AsRef<str>> Extend<S> for JobQueue {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        iter.into_iter().for_each(|seed| self.push(seed));
    }
}

/// Tally of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    pub failed: usize,
    /// Seeds or postings abandoned before traversal started.
    pub skipped: usize,
    pub below_threshold: usize,
    pub unscored: usize,
}

pub struct Runner {
    sites: HashMap<String, Box<dyn JobSource>>,
    registry: SiteRegistry,
    credentials: HashMap<String, Credentials>,
    cookies: CookieStore,
    scorer: Arc<dyn MatchScorer>,
    gate: MatchGate,
    engine: FormTraversalEngine,
    login_retry: RetryPolicy,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: SiteRegistry,
        credentials: HashMap<String, Credentials>,
        cookies: CookieStore,
        scorer: Arc<dyn MatchScorer>,
        gate: MatchGate,
        engine: FormTraversalEngine,
        login_retry: RetryPolicy,
    ) -> Self {
        Self {
            sites: HashMap::new(),
            registry,
            credentials,
            cookies,
            scorer,
            gate,
            engine,
            login_retry,
        }
    }

    /// Makes `source` the adapter for its site key, replacing any earlier one.
    pub fn add_site(&mut self, source: Box<dyn JobSource>) {
        let site = source.site().to_string();
        info!("Registered adapter for site '{site}'");
        self.sites.insert(site, source);
    }

    pub fn has_sites(&self) -> bool {
        !self.sites.is_empty()
    }

    pub async fn run(&mut self, mut queue: JobQueue) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();
        info!("Processing {} job seeds", queue.len());

        while let Some(seed) = queue.pop_front() {
            match self.process_seed(&seed, &mut summary).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Stopping run on {seed}: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping {seed}: {e}");
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn process_seed(&mut self, seed: &str, summary: &mut RunSummary) -> Result<(), AppError> {
        let site = self.registry.site_for(seed)?.to_string();
        let source = self
            .sites
            .get_mut(&site)
            .ok_or_else(|| AppError::Application(format!("No adapter available for {site}")))?;

        ensure_logged_in(
            source.as_mut(),
            &self.cookies,
            self.credentials.get(&site),
            &self.login_retry,
        )
        .await?;

        let jobs = source.discover_candidates(seed).await?;
        info!("Found {} candidate jobs at {seed}", jobs.len());
        let threshold = self.gate.threshold_for(&site);

        for job in jobs {
            match self.scorer.score(&job, threshold).await {
                None => {
                    warn!("Could not score {}; skipping", job.url);
                    summary.unscored += 1;
                    continue;
                }
                Some(result) if !result.eligible => {
                    info!(
                        "{} scored {}% (< {threshold}%); skipping",
                        job.url, result.score
                    );
                    summary.below_threshold += 1;
                    continue;
                }
                Some(result) => info!("{} scored {}%; applying", job.url, result.score),
            }

            if let Err(e) = source.open_application(&job).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Could not open application for {}: {e}", job.url);
                summary.skipped += 1;
                continue;
            }

            let mut session = ApplicationSession::new(site.clone(), job);
            let bound = self.engine.settings().application_timeout;
            let outcome =
                match run_bounded(bound, self.engine.traverse(&mut session, source.as_mut())).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => session.finish(Outcome::Failed(FailureReason::TimedOut)),
                };

            if let Err(e) = source.close_application().await {
                warn!("Could not close application for {}: {e}", session.job.url);
            }
            match outcome {
                Outcome::Submitted => summary.submitted += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }

        Ok(())
    }
}

/// Cookie restore first, credential login second. Cookies are saved after
/// a credential login so the next run can skip it.
async fn ensure_logged_in(
    source: &mut dyn JobSource,
    store: &CookieStore,
    credentials: Option<&Credentials>,
    policy: &RetryPolicy,
) -> Result<(), AppError> {
    if source.is_logged_in().await {
        return Ok(());
    }
    let site = source.site().to_string();

    match store.load(&site) {
        Ok(cookies) if !cookies.is_empty() => {
            source.restore_cookies(&cookies).await?;
            if source.is_logged_in().await {
                info!("Restored {site} session from saved cookies");
                return Ok(());
            }
            info!("Saved cookies for {site} are no longer valid");
        }
        Ok(_) => {}
        Err(e) => warn!("Could not load cookies for {site}: {e}"),
    }

    let credentials = credentials
        .ok_or_else(|| AppError::Config(format!("No credentials configured for {site}")))?;
    retry_with_backoff_on(
        source,
        policy,
        "login",
        |e: &AppError| !e.is_fatal(),
        |s| {
            let credentials = credentials.clone();
            Box::pin(async move { s.login(&credentials).await })
        },
    )
    .await?;
    info!("Logged in to {site}");

    match source.cookies().await {
        Ok(cookies) => {
            if let Err(e) = store.save(&site, &cookies) {
                warn!(
                    "Could not save cookies for {site} to {}: {e}",
                    store.path().display()
                );
            }
        }
        Err(e) => warn!("Could not read cookies for {site}: {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::Cookie;
    use crate::engine::EngineSettings;
    use crate::form::{FieldId, StepControl, StepState};
    use crate::models::{CandidateProfile, JobRef, MatchResult};
    use crate::resolution::testing::StubBackend;
    use crate::resolution::AnswerResolver;
    use crate::sites::recorded::fixtures::{credentials, two_step_fixture};
    use crate::sites::recorded::{Journal, RecordedSite};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedScorer(Option<u8>);

    #[async_trait]
    impl MatchScorer for FixedScorer {
        async fn score(&self, _job: &JobRef, threshold: u8) -> Option<MatchResult> {
            self.0.map(|score| MatchResult::new(score, threshold, None))
        }
    }

    struct Harness {
        runner: Runner,
        journal: Arc<Mutex<Journal>>,
        store: CookieStore,
        _dir: tempfile::TempDir,
    }

    fn harness(score: Option<u8>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookie_file.json"));

        let backend = StubBackend::new(vec![Ok("{\"answers\": [\"3\", \"Yes\"]}".to_string())]);
        let resolver = Arc::new(AnswerResolver::new(backend, RetryPolicy::default()));
        let profile = Arc::new(CandidateProfile::new(json!({}), HashMap::new()));
        let engine = FormTraversalEngine::new(resolver, profile, EngineSettings::default());

        let mut registry = SiteRegistry::default();
        registry.register("fixture.local", "fixture");
        let site = RecordedSite::new(two_step_fixture());
        let journal = site.journal();

        let mut runner = Runner::new(
            registry,
            HashMap::from([("fixture".to_string(), credentials())]),
            store.clone(),
            Arc::new(FixedScorer(score)),
            MatchGate::new(60, HashMap::new()),
            engine,
            RetryPolicy::new(3, Duration::from_millis(1), 2.0),
        );
        runner.add_site(Box::new(site));

        Harness {
            runner,
            journal,
            store,
            _dir: dir,
        }
    }

    /// Delegates to a recorded site, except that the first step snapshot
    /// never arrives.
    struct HangsOnce {
        inner: RecordedSite,
        hang_next_step: bool,
    }

    #[async_trait]
    impl JobSource for HangsOnce {
        fn site(&self) -> &str {
            self.inner.site()
        }

        async fn is_logged_in(&mut self) -> bool {
            self.inner.is_logged_in().await
        }

        async fn login(&mut self, credentials: &Credentials) -> Result<(), AppError> {
            self.inner.login(credentials).await
        }

        async fn cookies(&mut self) -> Result<Vec<Cookie>, AppError> {
            self.inner.cookies().await
        }

        async fn restore_cookies(&mut self, cookies: &[Cookie]) -> Result<(), AppError> {
            self.inner.restore_cookies(cookies).await
        }

        async fn discover_candidates(&mut self, seed: &str) -> Result<Vec<JobRef>, AppError> {
            self.inner.discover_candidates(seed).await
        }

        async fn open_application(&mut self, job: &JobRef) -> Result<(), AppError> {
            self.inner.open_application(job).await
        }

        async fn current_step(&mut self) -> Result<StepState, AppError> {
            if std::mem::take(&mut self.hang_next_step) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.current_step().await
        }

        async fn set_text(&mut self, field: &FieldId, value: &str) -> Result<(), AppError> {
            self.inner.set_text(field, value).await
        }

        async fn select_option(&mut self, field: &FieldId, option: &str) -> Result<bool, AppError> {
            self.inner.select_option(field, option).await
        }

        async fn check_all(&mut self, field: &FieldId) -> Result<(), AppError> {
            self.inner.check_all(field).await
        }

        async fn validation_error(&mut self, field: &FieldId) -> Result<Option<String>, AppError> {
            self.inner.validation_error(field).await
        }

        async fn advance(&mut self, control: StepControl) -> Result<(), AppError> {
            self.inner.advance(control).await
        }

        async fn rewind(&mut self) -> Result<(), AppError> {
            self.inner.rewind().await
        }

        async fn submit(&mut self) -> Result<(), AppError> {
            self.inner.submit().await
        }

        async fn close_application(&mut self) -> Result<(), AppError> {
            self.inner.close_application().await
        }
    }

    fn queue(seeds: &[&str]) -> JobQueue {
        let mut queue = JobQueue::new();
        queue.extend(seeds.iter().copied());
        queue
    }

    #[tokio::test]
    async fn test_eligible_job_is_submitted_and_cookies_saved() {
        let mut h = harness(Some(75));

        let summary = h
            .runner
            .run(queue(&["http://fixture.local/jobs/1"]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.failed, 0);
        let journal = h.journal.lock().unwrap();
        assert_eq!(journal.logins, 1);
        assert_eq!(journal.submitted, vec!["http://fixture.local/jobs/1".to_string()]);
        let saved = h.store.load("fixture").unwrap();
        assert!(saved.iter().any(|c| c.name == "session" && c.value == "tok-1"));
    }

    #[tokio::test]
    async fn test_saved_cookies_skip_credential_login() {
        let mut h = harness(Some(75));
        h.store
            .save("fixture", &[Cookie::new("session", "tok-1")])
            .unwrap();

        let summary = h
            .runner
            .run(queue(&["http://fixture.local/jobs/1"]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(h.journal.lock().unwrap().logins, 0);
    }

    #[tokio::test]
    async fn test_score_below_threshold_is_not_opened() {
        let mut h = harness(Some(59));

        let summary = h
            .runner
            .run(queue(&["http://fixture.local/jobs/1"]))
            .await
            .unwrap();

        assert_eq!(summary.below_threshold, 1);
        assert!(h.journal.lock().unwrap().opened.is_empty());
    }

    #[tokio::test]
    async fn test_unscored_job_is_skipped() {
        let mut h = harness(None);

        let summary = h
            .runner
            .run(queue(&["http://fixture.local/jobs/1"]))
            .await
            .unwrap();

        assert_eq!(summary.unscored, 1);
        assert_eq!(summary.submitted, 0);
    }

    #[tokio::test]
    async fn test_unsupported_seed_does_not_stop_the_queue() {
        let mut h = harness(Some(60));

        let summary = h
            .runner
            .run(queue(&[
                "https://example.org/jobs/1",
                "https://www.linkedin.com/jobs/view/1",
                "http://fixture.local/jobs/1",
            ]))
            .await
            .unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.submitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_step_times_out_and_queue_continues() {
        let mut h = harness(Some(75));
        let inner = RecordedSite::new(two_step_fixture());
        let journal = inner.journal();
        h.runner.add_site(Box::new(HangsOnce {
            inner,
            hang_next_step: true,
        }));
        let started = tokio::time::Instant::now();

        let summary = h
            .runner
            .run(queue(&[
                "http://fixture.local/jobs/1",
                "http://fixture.local/jobs/1",
            ]))
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.submitted, 1);
        assert!(started.elapsed() >= EngineSettings::default().application_timeout);
        assert!(started.elapsed() < Duration::from_secs(3600));
        let journal = journal.lock().unwrap();
        assert_eq!(journal.opened.len(), 2);
        assert_eq!(journal.submitted, vec!["http://fixture.local/jobs/1".to_string()]);
    }

    #[test]
    fn test_queue_reads_seeds_file_skipping_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "https://www.linkedin.com/jobs/view/1\n\n  \nlinkedin.com/jobs/2").unwrap();

        let mut queue = JobQueue::new();
        queue.push("https://careers.microsoft.com/1");
        assert_eq!(queue.extend_from_file(file.path()), 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.pop_front().as_deref(),
            Some("https://careers.microsoft.com/1")
        );
    }

    #[test]
    fn test_missing_seeds_file_adds_nothing() {
        let mut queue = JobQueue::new();
        assert_eq!(queue.extend_from_file(Path::new("/nonexistent/links.txt")), 0);
        assert!(queue.is_empty());
    }
}
