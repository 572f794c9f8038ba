// All LLM prompt constants for answer resolution and match scoring.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for match scoring.
pub const MATCH_SYSTEM: &str = "You are an expert recruitment assistant who analyzes job \
    descriptions and matches them against candidate profiles. Weigh technical skills, \
    experience and qualifications.";

/// Match prompt template. Replace `{resume}`, `{job_description}`, `{company}`.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"Rate how well this candidate matches the job posting at {company}.

Return a JSON object with this EXACT schema:
{
  "matching_percent": 72,
  "cover letter": "Optional short cover letter tailored to the role, only if matching_percent > 50"
}

Rules:
- "matching_percent" is an integer from 0 to 100.
- No other fields. No commentary.

RESUME:
{resume}

JOB DESCRIPTION:
{job_description}"#;

/// System prompt for answering application questions.
pub const ANSWERS_SYSTEM: &str = "You are an expert career counselor filling in job \
    application questions for a candidate. Pick the answers that are truthful to the \
    candidate's profile and give the best chance of an interview.";

/// Answers prompt template.
/// Replace: {voice_instruction}, {questions}, {resume}, {metadata}
pub const ANSWERS_PROMPT_TEMPLATE: &str = r#"{voice_instruction}

Answer every question below, in order.

Return a JSON object with this EXACT schema:
{
  "answers": ["answer to question 1", "answer to question 2"]
}

HARD RULES:
1. `answers` has exactly one string per question, in the same order as the questions
2. For questions of type "options", the answer MUST be one of that question's options, copied exactly
3. For questions of type "text", prefer a plain number when the question asks for a quantity
4. Never leave an answer empty

QUESTIONS:
{questions}

RESUME:
{resume}

METADATA (known answers to common questions):
{metadata}"#;
