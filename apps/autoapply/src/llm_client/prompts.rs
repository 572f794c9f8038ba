// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to every prompt that answers on the candidate's behalf.
pub const CANDIDATE_VOICE_INSTRUCTION: &str = "\
    You are answering as the candidate, a human software developer applying online. \
    Answer the way the candidate would, using only facts from the resume and metadata. \
    Prefer short direct answers; when a number is asked for, answer with a number.";

/// Renders a JSON value for embedding in a prompt. Falls back to `null`
/// for the (unreachable in practice) serialization failure.
pub fn json_block<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}
