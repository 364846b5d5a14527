use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-dimension match score for one resume against one job description.
///
/// Constructed through `ScoreRecord::new`, which clamps every score to 0–100 and
/// keeps `keywords_found <= total_keywords`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub overall_score: u8,
    pub skills_match: u8,
    pub experience_match: u8,
    pub education_match: u8,
    pub keywords_found: u32,
    pub total_keywords: u32,
    /// True when at least one field was missing from the model reply and defaulted to 0.
    #[serde(default)]
    pub partial: bool,
}

impl ScoreRecord {
    pub fn new(
        overall_score: i64,
        skills_match: i64,
        experience_match: i64,
        education_match: i64,
        keywords_found: i64,
        total_keywords: i64,
    ) -> Self {
        let total_keywords = clamp_count(total_keywords);
        Self {
            overall_score: clamp_score(overall_score),
            skills_match: clamp_score(skills_match),
            experience_match: clamp_score(experience_match),
            education_match: clamp_score(education_match),
            keywords_found: clamp_count(keywords_found).min(total_keywords),
            total_keywords,
            partial: false,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

fn clamp_score(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

fn clamp_count(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Which path produced an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerBackend {
    Remote,
    Fallback,
}

/// Scores plus free-text recommendations for one (job description, resume) pair.
///
/// `scores` holds exactly one entry, keyed by the caller-provided filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: BTreeMap<String, ScoreRecord>,
    pub recommendations: String,
    pub scorer_backend: ScorerBackend,
    /// Operator-facing note, e.g. credential setup guidance after an auth failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl EvaluationResult {
    pub fn single(
        filename: &str,
        record: ScoreRecord,
        recommendations: String,
        scorer_backend: ScorerBackend,
    ) -> Self {
        let mut scores = BTreeMap::new();
        scores.insert(filename.to_string(), record);
        Self {
            scores,
            recommendations,
            scorer_backend,
            notice: None,
        }
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn record(&self, filename: &str) -> Option<&ScoreRecord> {
        self.scores.get(filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyResume,
    AuthFailure,
    Internal,
}

/// Why a single resume could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome for one resume in a batch: an evaluation or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResumeOutcome {
    Evaluated(EvaluationResult),
    Failed(ErrorDescriptor),
}

impl ResumeOutcome {
    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        match self {
            ResumeOutcome::Evaluated(result) => Some(result),
            ResumeOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match self {
            ResumeOutcome::Evaluated(_) => None,
            ResumeOutcome::Failed(err) => Some(err),
        }
    }
}

/// Result of one batch call. `per_resume` has exactly one entry per input filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub per_resume: BTreeMap<String, ResumeOutcome>,
    /// SHA-256 hex of the untruncated job description.
    pub job_description_digest: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Flattened batch shape for direct storage in a metadata document:
/// every evaluated resume's scores, and `**filename:** text` recommendation paragraphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedReport {
    pub scores: BTreeMap<String, ScoreRecord>,
    pub recommendations: String,
}

impl BatchResult {
    pub fn combined_report(&self) -> CombinedReport {
        let mut scores = BTreeMap::new();
        let mut paragraphs = Vec::with_capacity(self.per_resume.len());

        for (filename, outcome) in &self.per_resume {
            match outcome {
                ResumeOutcome::Evaluated(result) => {
                    if let Some(record) = result.record(filename) {
                        scores.insert(filename.clone(), record.clone());
                    }
                    paragraphs.push(format!("**{filename}:** {}", result.recommendations));
                }
                ResumeOutcome::Failed(err) => {
                    paragraphs.push(format!("**{filename}:** Not evaluated: {}", err.message));
                }
            }
        }

        CombinedReport {
            scores,
            recommendations: paragraphs.join("\n\n"),
        }
    }
}
