pub mod client;
pub mod matching;
pub mod prompts;

pub use client::AnswerResolver;
pub use matching::{LlmMatchScorer, MatchGate, MatchScorer};
