//! Axum route handlers for the Evaluation API.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::scoring::batch::evaluate_batch;
use crate::scoring::engine::{check_configuration, evaluate_resume};
use crate::scoring::models::{BatchResult, CombinedReport, EvaluationResult, ResumeOutcome};
use crate::state::AppState;

/// Job descriptions shorter than this are rejected as not detailed enough.
const MIN_JOB_DESCRIPTION_CHARS: usize = 10;
const DEFAULT_RESUME_FILENAME: &str = "resume.pdf";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BatchEvaluationRequest {
    pub job_description: String,
    pub resumes: BTreeMap<String, String>,
    /// Optional per-request model tier override (`fast`, `quality`, or a model id).
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchEvaluationResponse {
    pub batch: BatchResult,
    pub report: CombinedReport,
}

#[derive(Debug, Deserialize)]
pub struct ResumeEvaluationRequest {
    pub job_description: String,
    pub resume_text: String,
    pub resume_filename: Option<String>,
    pub model: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/evaluations
///
/// Scores every resume in the request against one job description.
/// Per-resume problems are reported inside the batch, never as a request failure.
pub async fn handle_evaluate_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchEvaluationRequest>,
) -> Result<Json<BatchEvaluationResponse>, AppError> {
    validate_job_description(&request.job_description)?;
    if request.resumes.is_empty() {
        return Err(AppError::Validation(
            "resumes must contain at least one file".to_string(),
        ));
    }

    let mut config = state.config.scoring.clone();
    if let Some(model) = request.model {
        config.model = model;
    }

    let batch = evaluate_batch(
        state.transport.clone(),
        &request.job_description,
        request.resumes,
        &config,
    )
    .await?;
    let report = batch.combined_report();

    Ok(Json(BatchEvaluationResponse { batch, report }))
}

/// POST /api/v1/evaluations/resume
///
/// Scores a single resume. Convenience wrapper around the same pipeline.
pub async fn handle_evaluate_resume(
    State(state): State<AppState>,
    Json(request): Json<ResumeEvaluationRequest>,
) -> Result<Json<EvaluationResult>, AppError> {
    validate_job_description(&request.job_description)?;

    let mut config = state.config.scoring.clone();
    if let Some(model) = request.model {
        config.model = model;
    }
    check_configuration(&config)?;

    let filename = request
        .resume_filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_RESUME_FILENAME.to_string());

    match evaluate_resume(
        state.transport.clone(),
        &request.job_description,
        &request.resume_text,
        &filename,
        &config,
    )
    .await
    {
        ResumeOutcome::Evaluated(result) => Ok(Json(result)),
        ResumeOutcome::Failed(err) => Err(AppError::UnprocessableEntity(err.message)),
    }
}

fn validate_job_description(job_description: &str) -> Result<(), AppError> {
    if job_description.trim().chars().count() < MIN_JOB_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "job_description must be at least {MIN_JOB_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}
