// Shared prompt fragments.
// Each service that needs model calls defines its own prompts.rs alongside it.
// This file contains cross-cutting fragments only.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction that keeps every score inside the accepted range.
pub const SCORE_RANGE_INSTRUCTION: &str = "Every score is an integer from 0 to 100. \
    keywords_found and total_keywords are non-negative integers, and keywords_found \
    must never exceed total_keywords.";
