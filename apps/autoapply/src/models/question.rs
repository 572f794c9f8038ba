use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Normalizes question text into its identity key: newlines and runs of
/// whitespace collapse to one space, surrounding whitespace is trimmed, and
/// the result is lowercased.
pub fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    FreeText,
    MultiLineText,
    SingleSelect,
    MultiSelect,
}

impl QuestionKind {
    /// The `type` tag sent to the answer service.
    pub fn wire_type(&self) -> &'static str {
        match self {
            QuestionKind::FreeText | QuestionKind::MultiLineText => "text",
            QuestionKind::SingleSelect | QuestionKind::MultiSelect => "options",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, QuestionKind::FreeText | QuestionKind::MultiLineText)
    }
}

/// A form question as displayed, with its kind and (for selects) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Question {
    pub fn new(text: impl Into<String>, kind: QuestionKind, options: Vec<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            kind,
            options,
        }
    }

    pub fn key(&self) -> String {
        normalize_question(&self.text)
    }
}

/// Questions collected during one probe pass, in discovery order and
/// without duplicate normalized text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionBatch {
    questions: Vec<Question>,
    keys: HashSet<String>,
}

impl QuestionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the question unless one with the same normalized text is
    /// already present. Returns whether it was added.
    pub fn push(&mut self, question: Question) -> bool {
        if self.keys.insert(question.key()) {
            self.questions.push(question);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl FromIterator<Question> for QuestionBatch {
    fn from_iter<I: IntoIterator<Item = Question>>(iter: I) -> Self {
        let mut batch = QuestionBatch::new();
        for question in iter {
            batch.push(question);
        }
        batch
    }
}

/// Resolved answers keyed by normalized question text.
///
/// Only constructible from the batch that produced it: keys that are not
/// members of that batch are dropped on the way in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerMap {
    answers: HashMap<String, String>,
}

impl AnswerMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pairs answers with questions by position. Extra answers are ignored;
    /// missing trailing answers leave their questions unanswered.
    pub fn from_positional(batch: &QuestionBatch, answers: Vec<String>) -> Self {
        let answers = batch
            .questions()
            .iter()
            .zip(answers)
            .filter(|(_, answer)| !answer.trim().is_empty())
            .map(|(question, answer)| (question.key(), answer.trim().to_string()))
            .collect();
        Self { answers }
    }

    /// Accepts answers keyed by (un-normalized) question text.
    pub fn from_keyed<I>(batch: &QuestionBatch, answers: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let answers = answers
            .into_iter()
            .map(|(question, answer)| (normalize_question(&question), answer.trim().to_string()))
            .filter(|(key, answer)| batch.contains(key) && !answer.is_empty())
            .collect();
        Self { answers }
    }

    pub fn get(&self, question: &str) -> Option<&str> {
        self.answers
            .get(&normalize_question(question))
            .map(String::as_str)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.answers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}
