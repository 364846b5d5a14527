//! Token-budget truncation for prompt inputs and model replies.
//!
//! Token counts are estimated at 4 characters per token. Truncation keeps a
//! deterministic prefix (cut at a word boundary when one is close) and appends
//! `TRUNCATION_MARKER`. The output always fits the budget, so truncating it
//! again at the same budget returns it unchanged.

use std::borrow::Cow;

pub const CHARS_PER_TOKEN: usize = 4;
/// Job description + resume text combined.
pub const INPUT_TOKEN_BUDGET: usize = 4000;
/// Recommendations text in the model reply.
pub const RESPONSE_TOKEN_BUDGET: usize = 1500;
pub const TRUNCATION_MARKER: &str = "\n[...truncated]";

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Returns `text` unchanged when it fits `max_tokens`, otherwise a marked prefix that fits.
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> Cow<'_, str> {
    let budget_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    if text.chars().count() <= budget_chars {
        return Cow::Borrowed(text);
    }

    let marker_chars = TRUNCATION_MARKER.chars().count();
    if budget_chars <= marker_chars {
        return Cow::Owned(text.chars().take(budget_chars).collect());
    }

    let keep = budget_chars - marker_chars;
    let cut = byte_offset_of_char(text, keep);
    let mut prefix = &text[..cut];

    // Prefer ending on a word boundary when one exists in the back half.
    if let Some(ws) = prefix.rfind(char::is_whitespace) {
        if prefix[..ws].chars().count() > keep / 2 {
            prefix = &prefix[..ws];
        }
    }

    let mut out = String::with_capacity(prefix.len() + TRUNCATION_MARKER.len());
    out.push_str(prefix.trim_end());
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

/// Splits `total_tokens` between a job description and a resume, then truncates each.
///
/// Each side is guaranteed half the budget; a side that needs less donates the
/// remainder to the other.
pub fn fit_pair<'a>(
    job_description: &'a str,
    resume_text: &'a str,
    total_tokens: usize,
) -> (Cow<'a, str>, Cow<'a, str>) {
    let jd_tokens = estimate_tokens(job_description);
    let resume_tokens = estimate_tokens(resume_text);

    if jd_tokens + resume_tokens <= total_tokens {
        return (Cow::Borrowed(job_description), Cow::Borrowed(resume_text));
    }

    let half = total_tokens / 2;
    let jd_budget = if jd_tokens <= half {
        jd_tokens
    } else {
        half.max(total_tokens.saturating_sub(resume_tokens))
    };
    let resume_budget = total_tokens - jd_budget;

    (
        truncate_to_budget(job_description, jd_budget),
        truncate_to_budget(resume_text, resume_budget),
    )
}

fn byte_offset_of_char(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}
