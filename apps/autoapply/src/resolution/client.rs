//! Answer Resolution Client: the boundary to the AI text service.
//!
//! Two calls: score a posting against the profile (retried), and answer a
//! whole batch of form questions at once (not retried; a bad response
//! degrades to an empty answer map and the fill policy takes over).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::guards::{retry_with_backoff, RetryPolicy};
use crate::llm_client::prompts::{json_block, CANDIDATE_VOICE_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::repair::repair_json;
use crate::llm_client::CompletionBackend;
use crate::models::{AnswerMap, CandidateProfile, MatchResult, QuestionBatch};
use crate::resolution::prompts::{
    ANSWERS_PROMPT_TEMPLATE, ANSWERS_SYSTEM, MATCH_PROMPT_TEMPLATE, MATCH_SYSTEM,
};

/// One question as sent to the answer service.
#[derive(Debug, Serialize)]
struct QuestionRequest<'a> {
    question: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a [String]>,
}

/// Score and optional cover letter as parsed from the model.
#[derive(Debug, Clone, PartialEq)]
struct MatchReply {
    score: u8,
    cover_letter: Option<String>,
}

pub struct AnswerResolver {
    backend: Arc<dyn CompletionBackend>,
    match_policy: RetryPolicy,
}

impl AnswerResolver {
    /// `match_policy` governs the match call only; answer resolution is a
    /// single attempt.
    pub fn new(backend: Arc<dyn CompletionBackend>, match_policy: RetryPolicy) -> Self {
        Self {
            backend,
            match_policy,
        }
    }

    /// Scores a job description against the profile. `None` when every
    /// attempt failed or returned no usable `matching_percent`.
    pub async fn resolve_match(
        &self,
        profile: &CandidateProfile,
        description: &str,
        company: &str,
        threshold: u8,
    ) -> Option<MatchResult> {
        let prompt = MATCH_PROMPT_TEMPLATE
            .replace("{resume}", &json_block(profile.resume()))
            .replace("{company}", company)
            .replace("{job_description}", description);

        let reply = retry_with_backoff(
            &self.match_policy,
            "resolve_match",
            |e: &AppError| matches!(e, AppError::Resolution(_)),
            || self.try_match(&prompt),
        )
        .await;

        match reply {
            Ok(reply) => {
                info!("Matching percentage is {}%", reply.score);
                Some(MatchResult::new(reply.score, threshold, reply.cover_letter))
            }
            Err(e) => {
                warn!("Match scoring gave up: {e}");
                None
            }
        }
    }

    async fn try_match(&self, prompt: &str) -> Result<MatchReply, AppError> {
        let raw = self
            .backend
            .complete(prompt, &system_prompt(MATCH_SYSTEM))
            .await
            .map_err(|e| AppError::Resolution(format!("match call failed: {e}")))?;
        parse_match_reply(&raw)
    }

    /// Answers every question of the batch with one remote call.
    pub async fn resolve_answers(
        &self,
        batch: &QuestionBatch,
        profile: &CandidateProfile,
    ) -> AnswerMap {
        if batch.is_empty() {
            return AnswerMap::empty();
        }

        let prompt = build_answers_prompt(batch, profile);
        let system = system_prompt(ANSWERS_SYSTEM);
        let raw = match self.backend.complete(&prompt, &system).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Answer resolution call failed, falling back to defaults: {e}");
                return AnswerMap::empty();
            }
        };

        match parse_answers_reply(batch, &raw) {
            Ok(answers) => {
                info!("Resolved {}/{} questions", answers.len(), batch.len());
                answers
            }
            Err(e) => {
                warn!("Unusable answer response, falling back to defaults: {e}");
                debug!("Raw answer response: {raw}");
                AnswerMap::empty()
            }
        }
    }
}

fn system_prompt(role: &str) -> String {
    format!("{role} {JSON_ONLY_SYSTEM}")
}

fn build_answers_prompt(batch: &QuestionBatch, profile: &CandidateProfile) -> String {
    let questions: Vec<QuestionRequest<'_>> = batch
        .questions()
        .iter()
        .map(|q| QuestionRequest {
            question: &q.text,
            kind: q.kind.wire_type(),
            options: (!q.kind.is_text()).then_some(q.options.as_slice()),
        })
        .collect();

    ANSWERS_PROMPT_TEMPLATE
        .replace("{voice_instruction}", CANDIDATE_VOICE_INSTRUCTION)
        .replace("{questions}", &json_block(&questions))
        .replace("{resume}", &json_block(profile.resume()))
        .replace("{metadata}", &json_block(profile.metadata()))
}

fn parse_match_reply(raw: &str) -> Result<MatchReply, AppError> {
    let value: Value = serde_json::from_str(&repair_json(raw))
        .map_err(|e| AppError::Resolution(format!("match response is not JSON: {e}")))?;

    let score = value
        .get("matching_percent")
        .and_then(score_from_value)
        .ok_or_else(|| AppError::Resolution("match response has no matching_percent".into()))?;

    let cover_letter = ["cover letter", "cover_letter"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(MatchReply {
        score,
        cover_letter,
    })
}

/// Accepts `85`, `85.4`, `"85"` and `"85%"`; rejects null and blanks.
fn score_from_value(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() || score < 0.0 {
        return None;
    }
    Some(score.round().min(100.0) as u8)
}

fn parse_answers_reply(batch: &QuestionBatch, raw: &str) -> Result<AnswerMap, AppError> {
    let value: Value = serde_json::from_str(&repair_json(raw))
        .map_err(|e| AppError::Resolution(format!("answers response is not JSON: {e}")))?;

    let answers = match &value {
        Value::Object(obj) => obj.get("answers").unwrap_or(&value),
        _ => &value,
    };

    match answers {
        Value::Array(items) => {
            if items.len() != batch.len() {
                warn!(
                    "Answer count mismatch: {} answers for {} questions",
                    items.len(),
                    batch.len()
                );
            }
            Ok(AnswerMap::from_positional(
                batch,
                items.iter().map(answer_text).collect(),
            ))
        }
        Value::Object(obj) => Ok(AnswerMap::from_keyed(
            batch,
            obj.iter().map(|(k, v)| (k.clone(), answer_text(v))),
        )),
        _ => Err(AppError::Resolution(
            "answers response has neither a list nor a map of answers".into(),
        )),
    }
}

/// Flattens one answer to text. Objects shaped like `{"text", "value"}`
/// yield their value.
fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(obj) => obj
            .get("value")
            .or_else(|| obj.get("text"))
            .map(answer_text)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}
