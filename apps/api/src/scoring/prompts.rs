// Prompt constants and the scoring prompt builder.
//
// SCHEMA LOCKSTEP: the key names below are the only definition of the reply
// schema. `build_prompt` renders them into the instruction and
// `interpreter` reads replies with the same constants. Change both together.

use serde_json::{json, Map, Value};

use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, SCORE_RANGE_INSTRUCTION};
use crate::scoring::truncate::RESPONSE_TOKEN_BUDGET;

pub const SCORES_KEY: &str = "scores";
pub const RECOMMENDATIONS_KEY: &str = "recommendations";

pub const OVERALL_SCORE: &str = "overall_score";
pub const SKILLS_MATCH: &str = "skills_match";
pub const EXPERIENCE_MATCH: &str = "experience_match";
pub const EDUCATION_MATCH: &str = "education_match";
pub const KEYWORDS_FOUND: &str = "keywords_found";
pub const TOTAL_KEYWORDS: &str = "total_keywords";

/// Numeric fields of one score record, in the order they are presented to the model.
pub const SCORE_FIELDS: [&str; 6] = [
    OVERALL_SCORE,
    SKILLS_MATCH,
    EXPERIENCE_MATCH,
    EDUCATION_MATCH,
    KEYWORDS_FOUND,
    TOTAL_KEYWORDS,
];

/// Fixed role description for the scoring call.
pub const SCORING_ROLE: &str = "You are a resume coach reviewing someone's resume for \
    potential match against a job description from a job application. You will be given \
    the job description and the resume text. Score the resume in each area from 0 to 100, \
    count how many of the job description's important keywords appear in the resume, and \
    write one paragraph of concrete recommendations for improving the resume for this role.";

/// System + user messages for one scoring request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringPrompt {
    pub system: String,
    pub user: String,
}

/// Builds the scoring instruction. Identical inputs always produce identical prompts.
///
/// Inputs are expected to be truncated already (see `truncate::fit_pair`).
pub fn build_prompt(job_description: &str, resume_text: &str, resume_filename: &str) -> ScoringPrompt {
    let system = format!(
        "{SCORING_ROLE}\n\n{JSON_ONLY_INSTRUCTION}\n{SCORE_RANGE_INSTRUCTION}\n\n\
        Return a JSON object with this EXACT schema (no extra fields). \
        The key under \"{SCORES_KEY}\" MUST be exactly \"{resume_filename}\":\n{schema}\n\n\
        Keep \"{RECOMMENDATIONS_KEY}\" under {words} words.",
        schema = schema_example(resume_filename),
        words = RESPONSE_TOKEN_BUDGET * 3 / 4,
    );

    let user = format!(
        "<job_description>\n{}\n</job_description>\n\n<resume_text>\n{}\n</resume_text>",
        job_description.trim(),
        resume_text.trim()
    );

    ScoringPrompt { system, user }
}

/// Renders the expected reply shape with placeholder values.
pub fn schema_example(resume_filename: &str) -> String {
    let mut record = Map::new();
    for field in SCORE_FIELDS {
        record.insert(field.to_string(), json!(0));
    }

    let mut scores = Map::new();
    scores.insert(resume_filename.to_string(), Value::Object(record));

    let mut root = Map::new();
    root.insert(SCORES_KEY.to_string(), Value::Object(scores));
    root.insert(
        RECOMMENDATIONS_KEY.to_string(),
        json!("One paragraph of specific, actionable recommendations."),
    );

    serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_default()
}
