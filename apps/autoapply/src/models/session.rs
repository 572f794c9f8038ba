use std::fmt;

use uuid::Uuid;

use crate::models::job::JobRef;
use crate::models::question::{AnswerMap, QuestionBatch};

/// Traversal state machine. `Submitted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Probing,
    Resolving,
    Committing,
    Submitted,
    Failed,
}

impl TraversalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TraversalState::Submitted | TraversalState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    StepLimitExceeded { limit: usize },
    TimedOut,
    Application(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StepLimitExceeded { limit } => {
                write!(f, "form exceeded {limit} steps")
            }
            FailureReason::TimedOut => write!(f, "application timed out"),
            FailureReason::Application(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Submitted,
    Failed(FailureReason),
}

/// Per-job transient state. Created when a posting passes the match gate,
/// mutated only by the traversal engine, dropped when traversal ends.
#[derive(Debug)]
pub struct ApplicationSession {
    pub id: Uuid,
    pub site: String,
    pub job: JobRef,
    pub batch: QuestionBatch,
    pub answers: AnswerMap,
    pub step_index: usize,
    pub state: TraversalState,
    pub outcome: Option<Outcome>,
}

impl ApplicationSession {
    pub fn new(site: impl Into<String>, job: JobRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            site: site.into(),
            job,
            batch: QuestionBatch::new(),
            answers: AnswerMap::empty(),
            step_index: 0,
            state: TraversalState::Probing,
            outcome: None,
        }
    }

    /// Moves to a terminal state and records the outcome.
    pub fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.state = match outcome {
            Outcome::Submitted => TraversalState::Submitted,
            Outcome::Failed(_) => TraversalState::Failed,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobRef {
        JobRef {
            url: "https://www.linkedin.com/jobs/view/1".into(),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            description: String::new(),
        }
    }

    #[test]
    fn test_new_session_starts_probing_with_empty_state() {
        let session = ApplicationSession::new("linkedin", job());
        assert_eq!(session.state, TraversalState::Probing);
        assert!(session.batch.is_empty());
        assert!(session.answers.is_empty());
        assert!(session.outcome.is_none());
    }

    #[test]
    fn test_finish_sets_terminal_state() {
        let mut session = ApplicationSession::new("linkedin", job());
        session.finish(Outcome::Failed(FailureReason::TimedOut));
        assert_eq!(session.state, TraversalState::Failed);
        assert!(session.state.is_terminal());

        let mut session = ApplicationSession::new("linkedin", job());
        session.finish(Outcome::Submitted);
        assert_eq!(session.state, TraversalState::Submitted);
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::StepLimitExceeded { limit: 5 }.to_string(),
            "form exceeded 5 steps"
        );
    }
}
