//! Batch Coordinator: runs the single-resume pipeline for every resume against
//! one job description.
//!
//! Each resume is its own tokio task owning its own retry state; a semaphore
//! bounds concurrent outbound requests. One resume failing never aborts the batch.
//! If the batch deadline passes, unfinished tasks are aborted and those resumes
//! are finalised by the fallback scorer, so `per_resume` always has exactly one
//! entry per input filename.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::llm_client::CompletionTransport;
use crate::scoring::engine::{check_configuration, evaluate_resume, seconds, ScoringError};
use crate::scoring::fallback::fallback_evaluate;
use crate::scoring::models::{
    BatchResult, ErrorDescriptor, ErrorKind, ResumeOutcome, ScorerBackend,
};

const DEADLINE_NOTICE: &str =
    "Batch deadline exceeded before AI evaluation finished; scored by keyword analysis.";

/// Evaluates every resume against `job_description`.
///
/// The only error is a batch-level configuration problem, reported before any work starts.
pub async fn evaluate_batch(
    transport: Arc<dyn CompletionTransport>,
    job_description: &str,
    resumes: BTreeMap<String, String>,
    config: &ScoringConfig,
) -> Result<BatchResult, ScoringError> {
    check_configuration(config)?;

    let batch_id = Uuid::new_v4();
    let job_description_digest = hex::encode(Sha256::digest(job_description.as_bytes()));
    info!(
        "Batch {}: evaluating {} resume(s) (remote: {})",
        batch_id,
        resumes.len(),
        config.api_key.is_some()
    );

    // A deadline too far out to represent is no deadline at all.
    let deadline = config
        .batch_deadline_seconds
        .and_then(seconds)
        .and_then(|d| Instant::now().checked_add(d));

    let jd: Arc<str> = Arc::from(job_description);
    let shared_config = Arc::new(config.clone());
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

    let mut tasks = JoinSet::new();
    let mut task_files: HashMap<task::Id, String> = HashMap::new();
    for (filename, text) in &resumes {
        let transport = transport.clone();
        let jd = jd.clone();
        let config = shared_config.clone();
        let permits = permits.clone();
        let owned_filename = filename.clone();
        let text = text.clone();

        let handle = tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            let outcome = evaluate_resume(transport, &jd, &text, &owned_filename, &config).await;
            (owned_filename, outcome)
        });
        task_files.insert(handle.id(), filename.clone());
    }

    let mut per_resume: BTreeMap<String, ResumeOutcome> = BTreeMap::new();
    let mut deadline_hit = false;

    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                Ok(next) => next,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            },
            None => tasks.join_next().await,
        };

        match next {
            Some(Ok((filename, outcome))) => {
                per_resume.insert(filename, outcome);
            }
            Some(Err(join_error)) => {
                error!("Batch {}: evaluation task failed: {}", batch_id, join_error);
                if let Some(filename) = task_files.remove(&join_error.id()) {
                    let outcome = internal_failure(&filename);
                    per_resume.insert(filename, outcome);
                }
            }
            None => break,
        }
    }

    if deadline_hit {
        warn!(
            "Batch {}: deadline exceeded with {} resume(s) unfinished; finalising with fallback scorer",
            batch_id,
            resumes.len() - per_resume.len()
        );
        tasks.abort_all();
    }

    for (filename, text) in &resumes {
        if per_resume.contains_key(filename) {
            continue;
        }
        let outcome = if !deadline_hit {
            internal_failure(filename)
        } else if text.trim().is_empty() {
            ResumeOutcome::Failed(ErrorDescriptor {
                kind: ErrorKind::EmptyResume,
                message: format!("resume '{filename}' has no text to evaluate"),
            })
        } else {
            ResumeOutcome::Evaluated(
                fallback_evaluate(job_description, text, filename).with_notice(DEADLINE_NOTICE),
            )
        };
        per_resume.insert(filename.clone(), outcome);
    }

    log_summary(batch_id, &per_resume);

    Ok(BatchResult {
        batch_id,
        per_resume,
        job_description_digest,
        evaluated_at: Utc::now(),
    })
}

fn internal_failure(filename: &str) -> ResumeOutcome {
    ResumeOutcome::Failed(ErrorDescriptor {
        kind: ErrorKind::Internal,
        message: format!("evaluation of '{filename}' stopped unexpectedly"),
    })
}

fn log_summary(batch_id: Uuid, per_resume: &BTreeMap<String, ResumeOutcome>) {
    let (mut remote, mut fallback, mut failed) = (0, 0, 0);
    for outcome in per_resume.values() {
        match outcome {
            ResumeOutcome::Evaluated(r) if r.scorer_backend == ScorerBackend::Remote => remote += 1,
            ResumeOutcome::Evaluated(_) => fallback += 1,
            ResumeOutcome::Failed(_) => failed += 1,
        }
    }
    info!(
        "Batch {} complete: {} remote, {} fallback, {} failed",
        batch_id, remote, fallback, failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm_client::retry::testing::{HangingTransport, ScriptedTransport};
    use crate::llm_client::{CompletionRequest, RemoteFailure};

    /// Panics for resumes mentioning "explode", never answers for the rest.
    struct PanicOrHangTransport;

    #[async_trait]
    impl CompletionTransport for PanicOrHangTransport {
        async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, RemoteFailure> {
            if request.user.contains("explode") {
                panic!("transport bug");
            }
            std::future::pending().await
        }
    }

    const JD: &str = "Platform engineer: python, sql, docker, kubernetes";

    fn resumes(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(f, t)| (f.to_string(), t.to_string()))
            .collect()
    }

    fn keyed_config() -> ScoringConfig {
        ScoringConfig {
            api_key: Some("sk-test".to_string()),
            ..ScoringConfig::default()
        }
    }

    const GOOD_REPLY: &str = r#"{"scores": {"whatever.pdf": {"overall_score": 66, "skills_match": 70,
        "experience_match": 60, "education_match": 50, "keywords_found": 2, "total_keywords": 4}},
        "recommendations": "Describe your Kubernetes work in more depth."}"#;

    #[tokio::test]
    async fn test_batch_has_one_entry_per_input() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let input = resumes(&[
            ("a.pdf", "python and docker"),
            ("b.pdf", "sql"),
            ("empty.pdf", "  "),
        ]);

        let batch = evaluate_batch(transport, JD, input.clone(), &keyed_config())
            .await
            .unwrap();

        assert_eq!(
            batch.per_resume.keys().collect::<Vec<_>>(),
            input.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            batch.per_resume["empty.pdf"].error().unwrap().kind,
            ErrorKind::EmptyResume
        );
        let a = batch.per_resume["a.pdf"].evaluation().unwrap();
        assert_eq!(a.scorer_backend, ScorerBackend::Remote);
        assert_eq!(a.record("a.pdf").unwrap().overall_score, 66);
    }

    #[tokio::test]
    async fn test_no_credential_scores_everything_offline_with_zero_attempts() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let input = resumes(&[("a.pdf", "python"), ("b.pdf", "docker sql"), ("c.pdf", "go")]);

        let batch = evaluate_batch(transport.clone(), JD, input, &ScoringConfig::default())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 0);
        assert!(batch.per_resume.values().all(|o| {
            o.evaluation()
                .map(|r| r.scorer_backend == ScorerBackend::Fallback)
                .unwrap_or(false)
        }));
    }

    #[tokio::test]
    async fn test_missing_credential_with_fallback_disabled_is_batch_error() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let config = ScoringConfig {
            fallback_enabled: false,
            ..ScoringConfig::default()
        };

        let result = evaluate_batch(transport.clone(), JD, resumes(&[("a.pdf", "python")]), &config).await;

        assert!(matches!(result, Err(ScoringError::Configuration(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_batch_recovers_via_fallback() {
        let transport = Arc::new(ScriptedTransport::always(Err(RemoteFailure::RateLimited {
            retry_after: None,
        })));
        let input = resumes(&[("a.pdf", "python docker"), ("b.pdf", "sql")]);

        let batch = evaluate_batch(transport.clone(), JD, input, &keyed_config())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 6);
        for (filename, outcome) in &batch.per_resume {
            let result = outcome.evaluation().unwrap();
            assert_eq!(result.scorer_backend, ScorerBackend::Fallback);
            assert!(result.record(filename).is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_finalises_in_flight_resumes_with_fallback() {
        let config = ScoringConfig {
            timeout_seconds: 600.0,
            batch_deadline_seconds: Some(2.0),
            ..keyed_config()
        };
        let input = resumes(&[("a.pdf", "python"), ("b.pdf", "docker"), ("c.pdf", "")]);

        let batch = evaluate_batch(Arc::new(HangingTransport), JD, input, &config)
            .await
            .unwrap();

        assert_eq!(batch.per_resume.len(), 3);
        let a = batch.per_resume["a.pdf"].evaluation().unwrap();
        assert_eq!(a.scorer_backend, ScorerBackend::Fallback);
        assert_eq!(a.notice.as_deref(), Some(DEADLINE_NOTICE));
        assert_eq!(a.scores, fallback_evaluate(JD, "python", "a.pdf").scores);
        assert_eq!(
            batch.per_resume["c.pdf"].error().unwrap().kind,
            ErrorKind::EmptyResume
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_is_ignored() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let config = ScoringConfig {
            batch_deadline_seconds: Some(1.0e19),
            ..keyed_config()
        };
        let input = resumes(&[("a.pdf", "python"), ("b.pdf", "docker")]);

        let batch = evaluate_batch(transport.clone(), JD, input, &config).await.unwrap();

        assert_eq!(batch.per_resume.len(), 2);
        assert!(batch
            .per_resume
            .values()
            .all(|o| o.evaluation().map(|r| r.scorer_backend) == Some(ScorerBackend::Remote)));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_task_stays_internal_when_deadline_hits() {
        let config = ScoringConfig {
            timeout_seconds: 600.0,
            batch_deadline_seconds: Some(2.0),
            ..keyed_config()
        };
        let input = resumes(&[("a.pdf", "explode"), ("b.pdf", "docker")]);

        let batch = evaluate_batch(Arc::new(PanicOrHangTransport), JD, input, &config)
            .await
            .unwrap();

        assert_eq!(
            batch.per_resume["a.pdf"].error().unwrap().kind,
            ErrorKind::Internal
        );
        let b = batch.per_resume["b.pdf"].evaluation().unwrap();
        assert_eq!(b.scorer_backend, ScorerBackend::Fallback);
        assert_eq!(b.notice.as_deref(), Some(DEADLINE_NOTICE));
    }

    #[tokio::test]
    async fn test_single_permit_still_completes_batch() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let config = ScoringConfig {
            max_concurrency: 1,
            ..keyed_config()
        };
        let input = resumes(&[("a.pdf", "x1"), ("b.pdf", "x2"), ("c.pdf", "x3"), ("d.pdf", "x4")]);

        let batch = evaluate_batch(transport.clone(), JD, input, &config).await.unwrap();

        assert_eq!(batch.per_resume.len(), 4);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_digest_is_sha256_of_job_description() {
        let transport = Arc::new(ScriptedTransport::always(Ok(GOOD_REPLY.to_string())));
        let batch = evaluate_batch(transport, "abc", BTreeMap::new(), &ScoringConfig::default())
            .await
            .unwrap();

        assert!(batch.per_resume.is_empty());
        assert_eq!(
            batch.job_description_digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
