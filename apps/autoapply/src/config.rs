use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::form::FillPolicy;
use crate::guards::RetryPolicy;

const MAX_RETRY_ATTEMPTS: u32 = 10;
const MAX_INITIAL_DELAY_MS: u64 = 60_000;
const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub resume_path: PathBuf,
    pub metadata_path: PathBuf,
    pub credentials_path: PathBuf,
    pub cookie_file: PathBuf,
    /// Seed URLs (search pages or single postings), processed in order.
    pub job_seeds: Vec<String>,
    pub job_seeds_file: Option<PathBuf>,
    /// Recorded wizard replayed instead of a live browser.
    pub fixture_path: Option<PathBuf>,
    pub max_form_steps: usize,
    pub application_timeout: Duration,
    pub retry: RetryPolicy,
    pub match_attempts: u32,
    pub match_threshold: u8,
    pub site_thresholds: HashMap<String, u8>,
    /// Fill heuristics, overridable through `FORM_*` variables.
    pub fill_policy: FillPolicy,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let retry = retry_policy(
            parse_env("RETRY_ATTEMPTS", 3)?,
            parse_env("RETRY_INITIAL_DELAY_MS", 1000)?,
            parse_env("RETRY_BACKOFF_FACTOR", 2.0)?,
        )?;
        let match_attempts = parse_env("MATCH_ATTEMPTS", 3)?;
        ensure!(
            (1..=MAX_RETRY_ATTEMPTS).contains(&match_attempts),
            "MATCH_ATTEMPTS must be between 1 and {MAX_RETRY_ATTEMPTS}, got {match_attempts}"
        );

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            resume_path: path_env("RESUME_PATH", "data/resume.json"),
            metadata_path: path_env("METADATA_PATH", "data/metadata.json"),
            credentials_path: path_env("CREDENTIALS_PATH", "data/credentials.json"),
            cookie_file: path_env("COOKIE_FILE", "data/cookie_file.json"),
            job_seeds: std::env::var("JOB_SEEDS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            job_seeds_file: std::env::var("JOB_SEEDS_FILE").ok().map(PathBuf::from),
            fixture_path: std::env::var("FIXTURE_PATH").ok().map(PathBuf::from),
            max_form_steps: parse_env("MAX_FORM_STEPS", 5)?,
            application_timeout: Duration::from_secs(parse_env("APPLICATION_TIMEOUT_SECS", 100)?),
            retry,
            match_attempts,
            match_threshold: parse_env("MATCH_THRESHOLD", 60)?,
            site_thresholds: std::env::var("MATCH_THRESHOLDS")
                .map(|v| parse_site_thresholds(&v))
                .unwrap_or_else(|_| Ok(HashMap::new()))?,
            fill_policy: fill_policy(|key| std::env::var(key).ok())?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Login credentials for one site.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reads `{ "<site>": { "username": ..., "password": ... } }`.
pub fn load_credentials(path: &Path) -> Result<HashMap<String, Credentials>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Credentials file {} is not valid JSON", path.display()))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn path_env(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn retry_policy(attempts: u32, initial_delay_ms: u64, factor: f64) -> Result<RetryPolicy> {
    ensure!(
        (1..=MAX_RETRY_ATTEMPTS).contains(&attempts),
        "RETRY_ATTEMPTS must be between 1 and {MAX_RETRY_ATTEMPTS}, got {attempts}"
    );
    ensure!(
        initial_delay_ms <= MAX_INITIAL_DELAY_MS,
        "RETRY_INITIAL_DELAY_MS must be at most {MAX_INITIAL_DELAY_MS}, got {initial_delay_ms}"
    );
    ensure!(
        factor.is_finite() && (1.0..=MAX_BACKOFF_FACTOR).contains(&factor),
        "RETRY_BACKOFF_FACTOR must be between 1 and {MAX_BACKOFF_FACTOR}, got {factor}"
    );
    Ok(RetryPolicy::new(
        attempts,
        Duration::from_millis(initial_delay_ms),
        factor,
    ))
}

/// Applies `FORM_PLACEHOLDER`, `FORM_AFFIRMATIVE_OPTION`,
/// `FORM_NUMERIC_FALLBACK` and `FORM_CHECK_ALL_BOXES` over the defaults.
fn fill_policy(var: impl Fn(&str) -> Option<String>) -> Result<FillPolicy> {
    let mut policy = FillPolicy::default();
    let non_blank = |key: &str| -> Result<Option<String>> {
        match var(key) {
            Some(raw) => {
                let value = raw.trim();
                ensure!(!value.is_empty(), "{key} must not be blank");
                Ok(Some(value.to_string()))
            }
            None => Ok(None),
        }
    };

    if let Some(placeholder) = non_blank("FORM_PLACEHOLDER")? {
        policy.placeholder = placeholder;
    }
    if let Some(option) = non_blank("FORM_AFFIRMATIVE_OPTION")? {
        policy.affirmative_option = option;
    }
    if let Some(fallback) = non_blank("FORM_NUMERIC_FALLBACK")? {
        policy.numeric_fallback = fallback;
    }
    if let Some(raw) = var("FORM_CHECK_ALL_BOXES") {
        policy.check_all_boxes = raw
            .trim()
            .parse()
            .with_context(|| format!("FORM_CHECK_ALL_BOXES has an invalid value: '{raw}'"))?;
    }
    Ok(policy)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `linkedin=60,microsoft=80`.
fn parse_site_thresholds(raw: &str) -> Result<HashMap<String, u8>> {
    split_list(raw)
        .into_iter()
        .map(|pair| {
            let (site, score) = pair
                .split_once('=')
                .with_context(|| format!("MATCH_THRESHOLDS entry '{pair}' must be site=score"))?;
            let score = score
                .trim()
                .parse::<u8>()
                .with_context(|| format!("MATCH_THRESHOLDS score for '{site}' is not 0-255"))?;
            Ok((site.trim().to_lowercase(), score.min(100)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_site_thresholds() {
        let parsed = parse_site_thresholds("linkedin=60, Microsoft = 80").unwrap();
        assert_eq!(parsed.get("linkedin"), Some(&60));
        assert_eq!(parsed.get("microsoft"), Some(&80));
    }

    #[test]
    fn test_parse_site_thresholds_rejects_malformed_entry() {
        assert!(parse_site_thresholds("linkedin:60").is_err());
        assert!(parse_site_thresholds("linkedin=high").is_err());
    }

    #[test]
    fn test_retry_policy_within_limits() {
        let policy = retry_policy(3, 1000, 2.0).unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_retry_policy_rejects_out_of_range_values() {
        assert!(retry_policy(0, 1000, 2.0).is_err());
        assert!(retry_policy(50, 1000, 2.0).is_err());
        assert!(retry_policy(3, 3_600_000, 2.0).is_err());
        assert!(retry_policy(3, 1000, 1e20).is_err());
        assert!(retry_policy(3, 1000, f64::NAN).is_err());
        assert!(retry_policy(3, 1000, f64::INFINITY).is_err());
        assert!(retry_policy(3, 1000, 0.5).is_err());
    }

    #[test]
    fn test_fill_policy_overrides() {
        let vars = HashMap::from([
            ("FORM_PLACEHOLDER", " 2 "),
            ("FORM_AFFIRMATIVE_OPTION", "Oui"),
            ("FORM_CHECK_ALL_BOXES", "false"),
        ]);
        let policy = fill_policy(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(policy.placeholder, "2");
        assert_eq!(policy.affirmative_option, "Oui");
        assert!(!policy.check_all_boxes);
        assert_eq!(policy.numeric_fallback, FillPolicy::default().numeric_fallback);
    }

    #[test]
    fn test_fill_policy_rejects_blank_and_malformed_values() {
        assert!(fill_policy(|key| (key == "FORM_PLACEHOLDER").then(|| "  ".to_string())).is_err());
        assert!(
            fill_policy(|key| (key == "FORM_CHECK_ALL_BOXES").then(|| "sometimes".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_split_list_ignores_blanks() {
        assert_eq!(
            split_list(" linkedin.com , ,https://jobs.careers.microsoft.com/1 "),
            vec!["linkedin.com", "https://jobs.careers.microsoft.com/1"]
        );
    }

    #[test]
    fn test_load_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"linkedin": {{"username": "ada@example.com", "password": "hunter2"}}}}"#
        )
        .unwrap();
        let creds = load_credentials(file.path()).unwrap();
        assert_eq!(creds["linkedin"].username, "ada@example.com");
        assert!(!format!("{:?}", creds["linkedin"]).contains("hunter2"));
    }
}
