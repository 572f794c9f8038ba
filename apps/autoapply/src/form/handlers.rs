//! Field handlers: how each kind of control is filled on the probe and
//! commit passes, including the client-validation corrections.

use chrono::Local;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::form::classifier::ClassifiedField;
use crate::form::policy::{FillPolicy, ValidationFix};
use crate::models::{AnswerMap, CandidateProfile, QuestionKind};
use crate::sites::JobSource;

/// Which walk over the wizard a fill belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// First walk: placeholders in, questions out.
    Probe,
    /// Second walk: resolved answers in.
    Commit,
}

/// What a handler did to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillAction {
    /// Left as the site rendered it.
    Skipped,
    /// Filled from the candidate's canned metadata.
    Canned,
    /// Probe-pass placeholder or guess.
    Placeholder,
    /// Filled with the resolved answer.
    Answered,
    /// Commit pass without a usable answer; probe-style fill instead.
    Fallback,
    CheckedAll,
    /// No candidate value was accepted by the control.
    Unfilled,
}

pub struct FieldHandler<'a> {
    policy: &'a FillPolicy,
    profile: &'a CandidateProfile,
}

impl<'a> FieldHandler<'a> {
    pub fn new(policy: &'a FillPolicy, profile: &'a CandidateProfile) -> Self {
        Self { policy, profile }
    }

    pub async fn apply(
        &self,
        source: &mut dyn JobSource,
        cf: &ClassifiedField,
        pass: Pass,
        answers: &AnswerMap,
    ) -> Result<FillAction, AppError> {
        match cf.kind {
            QuestionKind::FreeText | QuestionKind::MultiLineText => {
                self.fill_text(source, cf, pass, answers).await
            }
            QuestionKind::SingleSelect => self.fill_select(source, cf, pass, answers).await,
            QuestionKind::MultiSelect => {
                if !self.policy.check_all_boxes {
                    return Ok(FillAction::Skipped);
                }
                source.check_all(&cf.field.id).await?;
                Ok(FillAction::CheckedAll)
            }
        }
    }

    async fn fill_text(
        &self,
        source: &mut dyn JobSource,
        cf: &ClassifiedField,
        pass: Pass,
        answers: &AnswerMap,
    ) -> Result<FillAction, AppError> {
        let field = &cf.field;
        if !field.required || self.policy.is_real_text_value(field.value.as_deref()) {
            return Ok(FillAction::Skipped);
        }

        let question = &cf.question.text;
        let (value, action) = if let Some(canned) = self.profile.canned_answer(question) {
            (canned, FillAction::Canned)
        } else {
            match (pass, answers.get(question)) {
                (Pass::Probe, _) => (self.policy.placeholder.as_str(), FillAction::Placeholder),
                (Pass::Commit, Some(answer)) => (answer, FillAction::Answered),
                (Pass::Commit, None) => (self.policy.placeholder.as_str(), FillAction::Fallback),
            }
        };

        source.set_text(&field.id, value).await?;
        self.correct_validation(source, cf, value).await?;
        Ok(action)
    }

    /// Rewrites the field once if the site rejects what was typed.
    async fn correct_validation(
        &self,
        source: &mut dyn JobSource,
        cf: &ClassifiedField,
        written: &str,
    ) -> Result<(), AppError> {
        let Some(message) = source.validation_error(&cf.field.id).await? else {
            return Ok(());
        };
        let corrected = match self.policy.classify_validation(&message) {
            Some(ValidationFix::Date(format)) => format.render(Local::now().date_naive()),
            Some(ValidationFix::Numeric) => self.policy.numeric_value(written),
            None => return Ok(()),
        };
        debug!(
            "'{}' rejected {:?} ({}); writing {:?}",
            cf.question.text, written, message, corrected
        );
        source.set_text(&cf.field.id, &corrected).await
    }

    async fn fill_select(
        &self,
        source: &mut dyn JobSource,
        cf: &ClassifiedField,
        pass: Pass,
        answers: &AnswerMap,
    ) -> Result<FillAction, AppError> {
        let field = &cf.field;
        let question = &cf.question.text;
        let real = self.policy.real_options(&field.options);
        let affirmative = self.policy.affirmative_option.as_str();

        let (chain, action) = if let Some(canned) = self.profile.canned_answer(question) {
            if self.policy.is_real_selection(field.value.as_deref()) {
                return Ok(FillAction::Skipped);
            }
            let mut chain = self.matching_options(&field.options, canned);
            chain.extend([Some(affirmative), real.first().copied()]);
            (chain, FillAction::Canned)
        } else {
            match (pass, answers.get(question)) {
                (Pass::Commit, Some(answer)) => {
                    let mut chain = self.matching_options(&field.options, answer);
                    if chain.is_empty() {
                        warn!("Answer {answer:?} is not an option of '{question}'");
                    }
                    let answered = chain.len();
                    chain.extend([Some(affirmative), real.first().copied()]);
                    return self.select_first(source, cf, &chain, answered).await;
                }
                _ if self.policy.is_real_selection(field.value.as_deref()) => {
                    return Ok(FillAction::Skipped);
                }
                (Pass::Probe, _) => (
                    vec![Some(affirmative), real.last().copied()],
                    FillAction::Placeholder,
                ),
                (Pass::Commit, None) => (
                    vec![Some(affirmative), real.first().copied()],
                    FillAction::Fallback,
                ),
            }
        };

        match self.select_first(source, cf, &chain, usize::MAX).await? {
            FillAction::Unfilled => Ok(FillAction::Unfilled),
            _ => Ok(action),
        }
    }

    /// The answer as an option label: exact match first, then a
    /// case-insensitive one.
    fn matching_options<'o>(&self, options: &'o [String], answer: &str) -> Vec<Option<&'o str>> {
        let answer = answer.trim();
        let exact = options.iter().find(|o| o.as_str() == answer);
        let loose = options
            .iter()
            .find(|o| o.trim().eq_ignore_ascii_case(answer));
        let mut out = Vec::new();
        for option in [exact, loose].into_iter().flatten() {
            if !self.policy.is_placeholder_option(option) && !out.contains(&Some(option.as_str())) {
                out.push(Some(option.as_str()));
            }
        }
        out
    }

    /// Tries candidates in order until the control accepts one. Candidates
    /// before index `answered` count as the resolved answer.
    async fn select_first(
        &self,
        source: &mut dyn JobSource,
        cf: &ClassifiedField,
        chain: &[Option<&str>],
        answered: usize,
    ) -> Result<FillAction, AppError> {
        let mut tried: Vec<&str> = Vec::new();
        for (i, candidate) in chain.iter().enumerate() {
            let Some(option) = *candidate else { continue };
            if tried.contains(&option) {
                continue;
            }
            tried.push(option);
            if source.select_option(&cf.field.id, option).await? {
                return Ok(if i < answered {
                    FillAction::Answered
                } else {
                    FillAction::Fallback
                });
            }
        }
        warn!("No option could be selected for '{}'", cf.question.text);
        Ok(FillAction::Unfilled)
    }
}
