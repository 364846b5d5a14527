//! Retry state machine for remote evaluation.
//!
//! Phases: `Idle → Attempting → {Success | Retrying | Exhausted | Fatal}`.
//! `RetryState` is pure (no clock, no I/O, jitter passed in) so every transition
//! is unit-testable. `RemoteEvaluator` drives it against a `CompletionTransport`.
//!
//! Backoff: exponential, base 500ms, ×2 per failed attempt, capped at 8s, with
//! "equal jitter" (each delay scaled by a factor in [0.5, 1.0]). A `Retry-After`
//! hint from the service raises the delay, still bounded by the cap.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use crate::llm_client::{CompletionRequest, CompletionTransport, RemoteFailure};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);
const BACKOFF_MULTIPLIER: u32 = 2;
/// ServiceError is retried at most this many times before escalating.
const SERVICE_ERROR_RETRIES: u32 = 1;
const MIN_JITTER: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first. Always ≥ 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Un-jittered delay after the `failed_attempts`-th failure: 500ms, 1s, 2s, 4s, 8s, 8s...
    pub fn nominal_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPhase {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Success,
    Exhausted,
    Fatal,
}

/// What the driver must do after a failed attempt.
#[derive(Debug)]
pub enum Transition {
    Retry(Duration),
    Fatal(RemoteFailure),
    Exhausted(RemoteFailure),
}

/// Per-request retry bookkeeping. Owned by exactly one evaluation.
#[derive(Debug, Clone)]
pub struct RetryState {
    phase: RetryPhase,
    attempts: u32,
    service_errors: u32,
    cumulative_backoff: Duration,
    last_error: Option<RemoteFailure>,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            phase: RetryPhase::Idle,
            attempts: 0,
            service_errors: 0,
            cumulative_backoff: Duration::ZERO,
            last_error: None,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cumulative_backoff(&self) -> Duration {
        self.cumulative_backoff
    }

    pub fn last_error(&self) -> Option<&RemoteFailure> {
        self.last_error.as_ref()
    }

    /// Enters `Attempting` and returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.phase = RetryPhase::Attempting {
            attempt: self.attempts,
        };
        self.attempts
    }

    pub fn succeed(&mut self) {
        self.phase = RetryPhase::Success;
    }

    /// Records a failed attempt and decides the next phase.
    ///
    /// `jitter` is clamped to [0.5, 1.0] and scales the nominal backoff.
    pub fn fail(&mut self, failure: RemoteFailure, policy: &RetryPolicy, jitter: f64) -> Transition {
        self.last_error = Some(failure.clone());

        let retryable = match &failure {
            RemoteFailure::AuthFailure { .. } => {
                self.phase = RetryPhase::Fatal;
                return Transition::Fatal(failure);
            }
            RemoteFailure::ServiceError { .. } => {
                self.service_errors += 1;
                self.service_errors <= SERVICE_ERROR_RETRIES
            }
            RemoteFailure::Exhausted { .. } => false,
            RemoteFailure::RateLimited { .. }
            | RemoteFailure::NetworkFailure(_)
            | RemoteFailure::Timeout(_) => true,
        };

        if !retryable || self.attempts >= policy.max_attempts {
            self.phase = RetryPhase::Exhausted;
            let last = match failure {
                RemoteFailure::Exhausted { last, .. } => last,
                other => Box::new(other),
            };
            return Transition::Exhausted(RemoteFailure::Exhausted {
                attempts: self.attempts,
                last,
            });
        }

        let jitter = if jitter.is_nan() {
            1.0
        } else {
            jitter.clamp(MIN_JITTER, 1.0)
        };
        let mut delay = policy.nominal_delay(self.attempts).mul_f64(jitter);
        if let RemoteFailure::RateLimited {
            retry_after: Some(hint),
        } = &failure
        {
            delay = delay.max((*hint).min(policy.max_delay));
        }

        self.cumulative_backoff += delay;
        self.phase = RetryPhase::Retrying {
            attempt: self.attempts,
            delay,
        };
        Transition::Retry(delay)
    }
}

fn jitter_factor() -> f64 {
    rand::rng().random_range(MIN_JITTER..=1.0)
}

/// Drives `RetryState` against a transport with a bounded per-attempt timeout.
#[derive(Clone)]
pub struct RemoteEvaluator {
    transport: Arc<dyn CompletionTransport>,
    api_key: String,
    policy: RetryPolicy,
    temperature: f32,
    max_response_tokens: u32,
}

impl RemoteEvaluator {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        api_key: String,
        policy: RetryPolicy,
        max_response_tokens: u32,
    ) -> Self {
        Self {
            transport,
            api_key,
            policy,
            temperature: super::SCORING_TEMPERATURE,
            max_response_tokens,
        }
    }

    /// Sends the prompt, retrying per policy. Returns the raw reply text, or the
    /// terminal failure (`AuthFailure` or `Exhausted`).
    pub async fn evaluate(
        &self,
        system: &str,
        user: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, RemoteFailure> {
        let mut state = RetryState::new();
        self.evaluate_with_state(system, user, model, timeout, &mut state)
            .await
    }

    pub async fn evaluate_with_state(
        &self,
        system: &str,
        user: &str,
        model: &str,
        timeout: Duration,
        state: &mut RetryState,
    ) -> Result<String, RemoteFailure> {
        let request = CompletionRequest {
            api_key: &self.api_key,
            model,
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_response_tokens,
        };

        loop {
            let attempt = state.begin_attempt();
            debug!(
                "Remote attempt {}/{} (model: {})",
                attempt, self.policy.max_attempts, model
            );

            let outcome = match tokio::time::timeout(timeout, self.transport.complete(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(RemoteFailure::Timeout(timeout)),
            };

            let failure = match outcome {
                Ok(text) => {
                    if let Some(previous) = state.last_error() {
                        debug!(
                            "Remote attempt {} succeeded after earlier {}",
                            attempt,
                            previous.kind()
                        );
                    }
                    state.succeed();
                    return Ok(text);
                }
                Err(failure) => failure,
            };

            let kind = failure.kind();
            match state.fail(failure, &self.policy, jitter_factor()) {
                Transition::Retry(delay) => {
                    debug!("Retry state: {:?}", state.phase());
                    warn!(
                        "Remote attempt {} failed ({}), retrying after {}ms...",
                        attempt,
                        kind,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Transition::Fatal(failure) => {
                    error!("Remote evaluation failed permanently: {failure}");
                    return Err(failure);
                }
                Transition::Exhausted(failure) => {
                    warn!(
                        "Remote evaluation exhausted after {} attempt(s), {}ms total backoff: {}",
                        state.attempts(),
                        state.cumulative_backoff().as_millis(),
                        failure
                    );
                    return Err(failure);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm_client::{CompletionRequest, CompletionTransport, RemoteFailure};

    /// Replays a fixed script of replies; once the script runs out, repeats `fallback`.
    /// Records every user message it receives.
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, RemoteFailure>>>,
        fallback: Result<String, RemoteFailure>,
        calls: AtomicU32,
        user_messages: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new(
            script: Vec<Result<String, RemoteFailure>>,
            fallback: Result<String, RemoteFailure>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                user_messages: Mutex::new(Vec::new()),
            }
        }

        pub fn always(reply: Result<String, RemoteFailure>) -> Self {
            Self::new(vec![], reply)
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn user_messages(&self) -> Vec<String> {
            self.user_messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, RemoteFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.user_messages
                .lock()
                .unwrap()
                .push(request.user.to_string());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Never answers; used to exercise timeouts and deadlines.
    pub struct HangingTransport;

    #[async_trait]
    impl CompletionTransport for HangingTransport {
        async fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, RemoteFailure> {
            std::future::pending().await
        }
    }
}
