//! Single-resume pipeline: truncate → build prompt → remote evaluate → interpret,
//! with the deterministic fallback scorer substituted when the remote path gives up.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ScoringConfig;
use crate::llm_client::retry::{RemoteEvaluator, RetryPolicy};
use crate::llm_client::{CompletionTransport, ModelTier, RemoteFailure, AUTH_SETUP_GUIDANCE};
use crate::scoring::fallback::fallback_evaluate;
use crate::scoring::interpreter::interpret;
use crate::scoring::models::{ErrorDescriptor, ErrorKind, ResumeOutcome};
use crate::scoring::prompts::build_prompt;
use crate::scoring::truncate::{fit_pair, INPUT_TOKEN_BUDGET, RESPONSE_TOKEN_BUDGET};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ScoringError {
    /// Batch-level: reported once, never per resume.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Rejects configurations that can score nothing: no credential and no fallback.
pub fn check_configuration(config: &ScoringConfig) -> Result<(), ScoringError> {
    if config.api_key.is_none() && !config.fallback_enabled {
        return Err(ScoringError::Configuration(format!(
            "no model-service credential is configured and fallback scoring is disabled. \
            {AUTH_SETUP_GUIDANCE} Alternatively set SCORER_FALLBACK_ENABLED=true."
        )));
    }
    Ok(())
}

/// Converts a seconds value from configuration, tolerating junk.
pub fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Evaluates one resume. Never returns an error: remote problems degrade to the
/// fallback scorer, and unscorable input becomes an `ErrorDescriptor`.
pub async fn evaluate_resume(
    transport: Arc<dyn CompletionTransport>,
    job_description: &str,
    resume_text: &str,
    resume_filename: &str,
    config: &ScoringConfig,
) -> ResumeOutcome {
    if resume_text.trim().is_empty() {
        return ResumeOutcome::Failed(ErrorDescriptor {
            kind: ErrorKind::EmptyResume,
            message: format!("resume '{resume_filename}' has no text to evaluate"),
        });
    }

    let Some(api_key) = config.api_key.clone() else {
        info!("No credential configured; scoring {} offline", resume_filename);
        return ResumeOutcome::Evaluated(fallback_evaluate(
            job_description,
            resume_text,
            resume_filename,
        ));
    };

    let (jd, resume) = fit_pair(job_description, resume_text, INPUT_TOKEN_BUDGET);
    let prompt = build_prompt(&jd, &resume, resume_filename);

    let evaluator = RemoteEvaluator::new(
        transport,
        api_key,
        RetryPolicy::with_max_attempts(config.max_attempts),
        RESPONSE_TOKEN_BUDGET as u32,
    );
    let model = ModelTier::parse(&config.model);
    let timeout = seconds(config.timeout_seconds).unwrap_or(DEFAULT_TIMEOUT);

    match evaluator
        .evaluate(&prompt.system, &prompt.user, model.model_id(), timeout)
        .await
    {
        Ok(raw) => ResumeOutcome::Evaluated(interpret(&raw, resume_filename)),
        Err(RemoteFailure::AuthFailure { message }) => {
            let guidance = format!("Model service rejected the credential ({message}). {AUTH_SETUP_GUIDANCE}");
            if config.fallback_enabled {
                warn!("Auth failure for {}; using fallback scorer", resume_filename);
                ResumeOutcome::Evaluated(
                    fallback_evaluate(job_description, resume_text, resume_filename)
                        .with_notice(guidance),
                )
            } else {
                ResumeOutcome::Failed(ErrorDescriptor {
                    kind: ErrorKind::AuthFailure,
                    message: guidance,
                })
            }
        }
        Err(failure) => {
            warn!(
                "Remote path unavailable for {} ({}); using fallback scorer",
                resume_filename,
                failure.kind()
            );
            ResumeOutcome::Evaluated(
                fallback_evaluate(job_description, resume_text, resume_filename).with_notice(
                    format!("AI evaluation unavailable ({failure}); scored by keyword analysis."),
                ),
            )
        }
    }
}
