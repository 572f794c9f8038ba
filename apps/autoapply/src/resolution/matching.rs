//! Match scoring: pluggable scorer plus the per-site threshold gate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{CandidateProfile, JobRef, MatchResult};
use crate::resolution::client::AnswerResolver;

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Scores a posting against the candidate. Implement this to swap the
/// scoring backend without touching the runner.
///
/// Carried in `Runner` as `Arc<dyn MatchScorer>`.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    /// `None` means the posting could not be scored at all.
    async fn score(&self, job: &JobRef, threshold: u8) -> Option<MatchResult>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmMatchScorer: asks the answer service for a matching percentage
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmMatchScorer {
    resolver: Arc<AnswerResolver>,
    profile: Arc<CandidateProfile>,
}

impl LlmMatchScorer {
    pub fn new(resolver: Arc<AnswerResolver>, profile: Arc<CandidateProfile>) -> Self {
        Self { resolver, profile }
    }
}

#[async_trait]
impl MatchScorer for LlmMatchScorer {
    async fn score(&self, job: &JobRef, threshold: u8) -> Option<MatchResult> {
        self.resolver
            .resolve_match(&self.profile, &job.description, &job.company, threshold)
            .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MatchGate
// ────────────────────────────────────────────────────────────────────────────

/// Picks the eligibility threshold for a site.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchGate {
    default_threshold: u8,
    site_thresholds: HashMap<String, u8>,
}

impl MatchGate {
    pub fn new(default_threshold: u8, site_thresholds: HashMap<String, u8>) -> Self {
        Self {
            default_threshold: default_threshold.min(100),
            site_thresholds: site_thresholds
                .into_iter()
                .map(|(site, t)| (site.to_lowercase(), t.min(100)))
                .collect(),
        }
    }

    pub fn threshold_for(&self, site: &str) -> u8 {
        self.site_thresholds
            .get(&site.to_lowercase())
            .copied()
            .unwrap_or(self.default_threshold)
    }
}
