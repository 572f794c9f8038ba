pub mod job;
pub mod profile;
pub mod question;
pub mod session;

pub use job::{JobRef, MatchResult};
pub use profile::CandidateProfile;
pub use question::{AnswerMap, Question, QuestionBatch, QuestionKind};
pub use session::{ApplicationSession, FailureReason, Outcome, TraversalState};
