//! Deterministic Fallback Scorer: network-free scoring used when the remote path
//! is unavailable, exhausted, or unauthorised.
//!
//! Algorithm:
//! 1. Keywords = distinct job-description tokens (lowercased, stopwords removed), in order.
//! 2. keywords_found = keywords present in the resume's token set.
//! 3. Each score dimension blends the overlap ratio with one byte of
//!    SHA-256(job_description ‖ 0x00 ‖ resume_text), folded into [0, 1].
//! 4. Recommendations list the first missing keywords in job-description order.
//!
//! Identical (job_description, resume_text) pairs always produce identical output.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::scoring::models::{EvaluationResult, ScoreRecord, ScorerBackend};

/// Maximum missing keywords named in the recommendations.
pub const MAX_MISSING_KEYWORDS: usize = 5;

/// (overlap weight, hash weight) per dimension.
const SKILLS_WEIGHTS: (f64, f64) = (0.8, 0.2);
const EXPERIENCE_WEIGHTS: (f64, f64) = (0.5, 0.5);
const EDUCATION_WEIGHTS: (f64, f64) = (0.3, 0.7);
/// overall = skills·0.5 + experience·0.3 + education·0.2
const OVERALL_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);

const STOPWORDS: &[&str] = &[
    "a", "about", "across", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "candidate", "etc", "experience", "for", "from", "have", "has", "help",
    "ideal", "in", "into", "is", "it", "its", "join", "knowledge", "looking", "may", "more",
    "must", "need", "nice", "of", "on", "or", "our", "plus", "preferred", "required",
    "requirements", "responsibilities", "role", "should", "skills", "strong", "team", "that",
    "the", "their", "this", "to", "using", "we", "will", "with", "work", "working", "years",
    "you", "your",
];

/// Scores a resume without any network call. Never fails.
pub fn fallback_evaluate(
    job_description: &str,
    resume_text: &str,
    resume_filename: &str,
) -> EvaluationResult {
    let keywords = extract_keywords(job_description);
    let resume_tokens: HashSet<String> = tokenize(resume_text).collect();

    let missing: Vec<&str> = keywords
        .iter()
        .filter(|k| !resume_tokens.contains(k.as_str()))
        .map(String::as_str)
        .collect();
    let total = keywords.len();
    let found = total - missing.len();

    let ratio = if total > 0 {
        found as f64 / total as f64
    } else {
        0.0
    };
    let digest = content_digest(job_description, resume_text);

    let skills = blend(ratio, digest[0], SKILLS_WEIGHTS);
    let experience = blend(ratio, digest[1], EXPERIENCE_WEIGHTS);
    let education = blend(ratio, digest[2], EDUCATION_WEIGHTS);
    let overall = skills * OVERALL_WEIGHTS.0 + experience * OVERALL_WEIGHTS.1 + education * OVERALL_WEIGHTS.2;

    let record = ScoreRecord::new(
        overall.round() as i64,
        skills.round() as i64,
        experience.round() as i64,
        education.round() as i64,
        found as i64,
        total as i64,
    );
    let recommendations = build_recommendation(&record, &missing);

    EvaluationResult::single(resume_filename, record, recommendations, ScorerBackend::Fallback)
}

/// Distinct keywords of a job description in first-occurrence order.
pub fn extract_keywords(job_description: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(job_description)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Lowercased tokens, keeping `+`, `#` and inner dots (c++, c#, node.js).
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn content_digest(job_description: &str, resume_text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(job_description.as_bytes());
    hasher.update([0u8]);
    hasher.update(resume_text.as_bytes());
    hasher.finalize().into()
}

/// Weighted blend of the overlap ratio and a hash byte, on a 0–100 scale.
fn blend(ratio: f64, hash_byte: u8, (overlap_weight, hash_weight): (f64, f64)) -> f64 {
    let hashed = hash_byte as f64 / u8::MAX as f64;
    ((overlap_weight * ratio + hash_weight * hashed) * 100.0).clamp(0.0, 100.0)
}

/// Builds a human-readable recommendation string from the record and missing keywords.
fn build_recommendation(record: &ScoreRecord, missing: &[&str]) -> String {
    let score = record.overall_score;
    let top_missing = missing
        .iter()
        .take(MAX_MISSING_KEYWORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");

    if record.total_keywords == 0 {
        "No keywords could be extracted from the job description, so this is a rough \
        estimate. Make sure your resume states your core skills, quantified achievements, \
        and education clearly."
            .to_string()
    } else if missing.is_empty() {
        format!(
            "Strong keyword coverage ({}/{}). Strengthen it further with quantifiable \
            results for each listed skill.",
            record.keywords_found, record.total_keywords
        )
    } else if score >= 60 {
        format!(
            "Moderate fit ({score}/100). Consider adding evidence for: {top_missing}. \
            Include quantifiable achievements where you used these."
        )
    } else {
        format!(
            "Low fit ({score}/100). Missing job description keywords: {top_missing}. \
            Tailor your resume to this role by demonstrating these skills with concrete examples."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JD: &str = "Senior Backend Engineer. Required: Python, SQL, Docker, Kubernetes, AWS. \
        Nice to have: Terraform and Go. You will build data pipelines.";
    const RESUME: &str = "Built data pipelines in Python and Go on AWS with Docker.";

    #[test]
    fn test_keyword_overlap_scenario() {
        let result = fallback_evaluate("python sql docker", "python docker", "cv.pdf");
        let record = result.record("cv.pdf").unwrap();
        assert_eq!(record.keywords_found, 2);
        assert_eq!(record.total_keywords, 3);
        assert!(result.recommendations.contains("sql"));
    }

    #[test]
    fn test_stopwords_do_not_count_as_keywords() {
        let result = fallback_evaluate("We need Python, SQL and Docker experience.", "python docker", "cv.pdf");
        let record = result.record("cv.pdf").unwrap();
        assert_eq!(record.keywords_found, 2);
        assert_eq!(record.total_keywords, 3);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_evaluate(JD, RESUME, "cv.pdf");
        let b = fallback_evaluate(JD, RESUME, "cv.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn test_filename_does_not_change_scores() {
        let a = fallback_evaluate(JD, RESUME, "a.pdf");
        let b = fallback_evaluate(JD, RESUME, "b.pdf");
        assert_eq!(a.record("a.pdf"), b.record("b.pdf"));
    }

    #[test]
    fn test_scores_bounded_and_keywords_consistent() {
        let inputs = [
            ("", ""),
            (JD, ""),
            ("", RESUME),
            (JD, RESUME),
            (JD, JD),
            ("rust rust rust", "RUST"),
        ];
        for (jd, resume) in inputs {
            let result = fallback_evaluate(jd, resume, "cv.pdf");
            let r = result.record("cv.pdf").unwrap();
            for score in [r.overall_score, r.skills_match, r.experience_match, r.education_match] {
                assert!(score <= 100);
            }
            assert!(r.keywords_found <= r.total_keywords);
            assert!(!result.recommendations.is_empty());
            assert_eq!(result.scorer_backend, ScorerBackend::Fallback);
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let result = fallback_evaluate("Kubernetes Terraform", "kubernetes TERRAFORM", "cv.pdf");
        let r = result.record("cv.pdf").unwrap();
        assert_eq!((r.keywords_found, r.total_keywords), (2, 2));
        assert!(result.recommendations.contains("Strong keyword coverage"));
    }

    #[test]
    fn test_missing_keywords_listed_in_jd_order_and_capped() {
        let jd = "alpha bravo charlie delta echo foxtrot golf";
        let result = fallback_evaluate(jd, "nothing relevant here", "cv.pdf");
        assert!(result
            .recommendations
            .contains("alpha, bravo, charlie, delta, echo."));
        assert!(!result.recommendations.contains("foxtrot"));
    }

    #[test]
    fn test_extract_keywords_keeps_symbols_and_order() {
        assert_eq!(
            extract_keywords("C++ and C# with Node.js; then c++ again. 2024"),
            vec!["c++", "c#", "node.js", "then", "again"]
        );
    }

    #[test]
    fn test_full_overlap_beats_no_overlap_on_skills() {
        let jd = "python sql docker";
        let full = fallback_evaluate(jd, "python sql docker", "cv.pdf");
        let none = fallback_evaluate(jd, "gardening", "cv.pdf");
        // skills = 80·ratio + 20·hash, so full overlap is at least 80 and none at most 20.
        assert!(full.record("cv.pdf").unwrap().skills_match >= 80);
        assert!(none.record("cv.pdf").unwrap().skills_match <= 20);
    }
}
