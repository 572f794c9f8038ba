//! Field Classifier: maps each control on a step to a question kind and
//! decides which questions the probe pass still has to ask.
//!
//! Both functions are pure over the step snapshot, so probing the same
//! step twice with an empty answer map yields the same questions in the
//! same order.

use crate::form::policy::FillPolicy;
use crate::form::step::{ControlType, FormField, FormStep};
use crate::models::{AnswerMap, CandidateProfile, Question, QuestionKind};

/// A control paired with its kind and the question it asks.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedField {
    pub field: FormField,
    pub kind: QuestionKind,
    pub question: Question,
}

pub struct FieldClassifier<'a> {
    policy: &'a FillPolicy,
}

impl<'a> FieldClassifier<'a> {
    pub fn new(policy: &'a FillPolicy) -> Self {
        Self { policy }
    }

    /// Classifies every labelled control on the step, in display order.
    pub fn classify(&self, step: &FormStep) -> Vec<ClassifiedField> {
        step.fields
            .iter()
            .filter(|field| !field.label.trim().is_empty())
            .map(|field| {
                let kind = kind_of(&field.control);
                let options = match kind {
                    QuestionKind::SingleSelect | QuestionKind::MultiSelect => self
                        .policy
                        .real_options(&field.options)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    _ => Vec::new(),
                };
                ClassifiedField {
                    field: field.clone(),
                    kind,
                    question: Question::new(field.label.clone(), kind, options),
                }
            })
            .collect()
    }

    /// Questions on this step that neither the site, the canned metadata,
    /// nor the answer map already settle.
    pub fn pending_questions(
        &self,
        step: &FormStep,
        answers: &AnswerMap,
        profile: &CandidateProfile,
    ) -> Vec<Question> {
        self.classify(step)
            .into_iter()
            .filter(|cf| self.needs_resolution(cf, answers, profile))
            .map(|cf| cf.question)
            .collect()
    }

    fn needs_resolution(
        &self,
        cf: &ClassifiedField,
        answers: &AnswerMap,
        profile: &CandidateProfile,
    ) -> bool {
        let text = &cf.question.text;
        if answers.get(text).is_some() || profile.canned_answer(text).is_some() {
            return false;
        }
        match cf.kind {
            QuestionKind::FreeText | QuestionKind::MultiLineText => {
                cf.field.required && !self.policy.is_real_text_value(cf.field.value.as_deref())
            }
            QuestionKind::SingleSelect => {
                !self.policy.is_real_selection(cf.field.value.as_deref())
            }
            QuestionKind::MultiSelect => false,
        }
    }
}

fn kind_of(control: &ControlType) -> QuestionKind {
    match control {
        ControlType::TextInput { .. } => QuestionKind::FreeText,
        ControlType::TextArea => QuestionKind::MultiLineText,
        ControlType::Select | ControlType::RadioGroup => QuestionKind::SingleSelect,
        ControlType::CheckboxGroup => QuestionKind::MultiSelect,
    }
}
