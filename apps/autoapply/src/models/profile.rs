use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::models::question::normalize_question;

/// The candidate's resume and canned answers. Loaded once at startup and
/// shared read-only (behind an `Arc`) for the rest of the run.
#[derive(Debug, Clone)]
pub struct CandidateProfile {
    resume: Value,
    metadata: HashMap<String, String>,
}

impl CandidateProfile {
    pub fn new(resume: Value, metadata: HashMap<String, String>) -> Self {
        let metadata = metadata
            .into_iter()
            .map(|(question, answer)| (normalize_question(&question), answer))
            .collect();
        Self { resume, metadata }
    }

    /// Reads the resume document and the metadata map from JSON files.
    /// Metadata values that are not strings (numbers, booleans) are kept in
    /// their JSON text form.
    pub fn load(resume_path: &Path, metadata_path: &Path) -> Result<Self, AppError> {
        let resume: Value = serde_json::from_str(&std::fs::read_to_string(resume_path)?)?;
        let raw: HashMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(metadata_path)?)?;

        let metadata = raw
            .into_iter()
            .map(|(question, value)| {
                let answer = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (question, answer)
            })
            .collect::<HashMap<_, _>>();

        info!(
            "Loaded candidate profile ({} canned answers)",
            metadata.len()
        );
        Ok(Self::new(resume, metadata))
    }

    pub fn resume(&self) -> &Value {
        &self.resume
    }

    /// Canned answer for a question, looked up by normalized text.
    pub fn canned_answer(&self, question: &str) -> Option<&str> {
        self.metadata
            .get(&normalize_question(question))
            .map(String::as_str)
            .filter(|answer| !answer.trim().is_empty())
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_canned_answer_lookup_is_normalized() {
        let profile = CandidateProfile::new(
            json!({"name": "Ada"}),
            HashMap::from([("Notice Period\n(days)".to_string(), "30".to_string())]),
        );
        assert_eq!(profile.canned_answer("notice period (days)"), Some("30"));
        assert_eq!(profile.canned_answer("  NOTICE PERIOD (DAYS) "), Some("30"));
        assert_eq!(profile.canned_answer("salary"), None);
    }

    #[test]
    fn test_blank_canned_answer_is_ignored() {
        let profile = CandidateProfile::new(
            json!({}),
            HashMap::from([("Website".to_string(), "   ".to_string())]),
        );
        assert_eq!(profile.canned_answer("website"), None);
    }

    #[test]
    fn test_load_from_files() {
        let mut resume = tempfile::NamedTempFile::new().unwrap();
        write!(resume, r#"{{"skills": ["rust", "sql"]}}"#).unwrap();
        let mut metadata = tempfile::NamedTempFile::new().unwrap();
        write!(
            metadata,
            r#"{{"Years of Rust experience?": 4, "City": "Lisbon"}}"#
        )
        .unwrap();

        let profile = CandidateProfile::load(resume.path(), metadata.path()).unwrap();
        assert_eq!(profile.resume()["skills"][0], "rust");
        assert_eq!(profile.canned_answer("years of rust experience?"), Some("4"));
        assert_eq!(profile.canned_answer("city"), Some("Lisbon"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = CandidateProfile::load(
            Path::new("/nonexistent/resume.json"),
            Path::new("/nonexistent/metadata.json"),
        );
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
