use serde::{Deserialize, Serialize};

/// A candidate posting as discovered by a site adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
}

/// Score of a posting against the candidate profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// 0 – 100
    pub score: u8,
    pub eligible: bool,
    pub cover_letter: Option<String>,
}

impl MatchResult {
    /// `eligible` is inclusive of the threshold.
    pub fn new(score: u8, threshold: u8, cover_letter: Option<String>) -> Self {
        let score = score.min(100);
        Self {
            score,
            eligible: score >= threshold,
            cover_letter,
        }
    }
}
