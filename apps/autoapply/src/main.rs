mod config;
mod cookies;
mod engine;
mod errors;
mod form;
mod guards;
mod llm_client;
mod models;
mod resolution;
mod runner;
mod sites;

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{load_credentials, Config};
use crate::cookies::CookieStore;
use crate::engine::{EngineSettings, FormTraversalEngine};
use crate::errors::AppError;
use crate::guards::{run_blocking_bounded, RetryPolicy};
use crate::llm_client::{CompletionBackend, LlmClient};
use crate::models::CandidateProfile;
use crate::resolution::{AnswerResolver, LlmMatchScorer, MatchGate};
use crate::runner::{JobQueue, Runner};
use crate::sites::recorded::RecordedSite;
use crate::sites::{JobSource, SiteRegistry};

const PROFILE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting autoapply v{}", env!("CARGO_PKG_VERSION"));

    // Candidate profile
    let (resume_path, metadata_path) = (config.resume_path.clone(), config.metadata_path.clone());
    let profile = run_blocking_bounded(PROFILE_LOAD_TIMEOUT, move || {
        CandidateProfile::load(&resume_path, &metadata_path)
    })
    .await
    .map_err(AppError::from)??;
    let profile = Arc::new(profile);

    // Initialize LLM client
    let llm: Arc<dyn CompletionBackend> =
        Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let match_policy = RetryPolicy {
        max_attempts: config.match_attempts,
        ..config.retry
    };
    let resolver = Arc::new(AnswerResolver::new(llm, match_policy));
    let scorer = Arc::new(LlmMatchScorer::new(resolver.clone(), profile.clone()));
    let gate = MatchGate::new(config.match_threshold, config.site_thresholds.clone());

    let engine = FormTraversalEngine::new(
        resolver,
        profile,
        EngineSettings {
            max_steps: config.max_form_steps,
            application_timeout: config.application_timeout,
            step_retry: config.retry,
        },
    )
    .with_policy(config.fill_policy.clone());

    let credentials = match load_credentials(&config.credentials_path) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("{e:#}; only saved cookies can log in");
            HashMap::new()
        }
    };

    // Site adapters
    let mut registry = SiteRegistry::default();
    let mut adapters = Vec::new();
    if let Some(path) = &config.fixture_path {
        let site = RecordedSite::from_file(path)?;
        if let Some(host) = site.host() {
            registry.register(host, site.site());
        }
        adapters.push(site);
    }

    let mut runner = Runner::new(
        registry,
        credentials,
        CookieStore::new(&config.cookie_file),
        scorer,
        gate,
        engine,
        config.retry,
    );
    let journals: Vec<_> = adapters
        .iter()
        .map(|site| (site.site().to_string(), site.journal()))
        .collect();
    for site in adapters {
        runner.add_site(Box::new(site));
    }
    if !runner.has_sites() {
        return Err(AppError::Browser(
            "no site adapter available; set FIXTURE_PATH to replay a recorded site".to_string(),
        )
        .into());
    }

    let mut queue = JobQueue::new();
    queue.extend(config.job_seeds.iter());
    if let Some(path) = &config.job_seeds_file {
        let added = queue.extend_from_file(path);
        info!("Loaded {added} job seeds from {}", path.display());
    }
    if queue.is_empty() {
        warn!("No job seeds configured; set JOB_SEEDS or JOB_SEEDS_FILE");
    }

    let summary = runner.run(queue).await?;
    info!(
        "Run finished: {} submitted, {} failed, {} skipped, {} below threshold, {} unscored",
        summary.submitted,
        summary.failed,
        summary.skipped,
        summary.below_threshold,
        summary.unscored
    );

    for (site, journal) in journals {
        if let Ok(journal) = journal.lock() {
            info!(
                "Replayed {site}: {} logins, {} interactions, {} opened, {} submitted",
                journal.logins,
                journal.interactions.len(),
                journal.opened.len(),
                journal.submitted.len()
            );
        }
    }

    Ok(())
}
