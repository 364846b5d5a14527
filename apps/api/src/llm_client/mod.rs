/// LLM Client: the single point of entry for all model-service calls in the scorer.
///
/// ARCHITECTURAL RULE: No other module may call the model API directly.
/// All remote interactions MUST go through a `CompletionTransport`, and all retry
/// decisions MUST go through `retry::RemoteEvaluator`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;
pub mod retry;

/// Cheap, fast tier used unless the caller asks for `quality`.
pub const FAST_MODEL: &str = "gpt-4o-mini";
/// Higher-quality tier.
pub const QUALITY_MODEL: &str = "gpt-4o";
/// Fixed sampling temperature so repeated scoring stays within tolerance.
pub const SCORING_TEMPERATURE: f32 = 0.0;
/// Hard ceiling on a single HTTP exchange. Per-attempt timeouts are enforced
/// separately by the evaluator and are normally much shorter.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

pub const AUTH_SETUP_GUIDANCE: &str = "Set OPENAI_API_KEY to a valid key for the model \
    service (or remove it to run in fallback-only mode) and retry.";

/// Classified outcome of a failed remote attempt.
///
/// This is a tagged result, not control flow by panic: the retry state machine
/// decides what each variant means for the next attempt.
#[derive(Debug, Clone, Error)]
pub enum RemoteFailure {
    #[error("authentication failed: {message}")]
    AuthFailure { message: String },

    #[error("rate limited by model service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service error (status {status:?}): {message}")]
    ServiceError {
        status: Option<u16>,
        message: String,
    },

    #[error("remote evaluation exhausted after {attempts} attempt(s); last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RemoteFailure>,
    },
}

impl RemoteFailure {
    /// Short machine-readable tag, used in logs and error descriptors.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteFailure::AuthFailure { .. } => "auth_failure",
            RemoteFailure::RateLimited { .. } => "rate_limited",
            RemoteFailure::NetworkFailure(_) => "network_failure",
            RemoteFailure::Timeout(_) => "timeout",
            RemoteFailure::ServiceError { .. } => "service_error",
            RemoteFailure::Exhausted { .. } => "exhausted",
        }
    }
}

/// Selects a concrete model id. `fast` and `quality` are tier aliases; anything
/// else is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Quality,
    Custom(String),
}

impl ModelTier {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "fast" => ModelTier::Fast,
            "quality" => ModelTier::Quality,
            _ => ModelTier::Custom(raw.trim().to_string()),
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            ModelTier::Fast => FAST_MODEL,
            ModelTier::Quality => QUALITY_MODEL,
            ModelTier::Custom(id) => id,
        }
    }
}

/// One outbound request. The credential travels with the request so the
/// transport never looks anything up from the process environment.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub api_key: &'a str,
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Seam between the retry logic and the wire. Production uses `LlmClient`;
/// tests inject scripted fakes.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, RemoteFailure>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// HTTP transport for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionTransport for LlmClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, RemoteFailure> {
        let body = ChatRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, retry_after));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| RemoteFailure::ServiceError {
            status: Some(status.as_u16()),
            message: format!("undecodable response body: {e}"),
        })?;

        if let Some(usage) = &chat.usage {
            debug!(
                "Model call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| RemoteFailure::ServiceError {
                status: Some(status.as_u16()),
                message: "model returned empty content".to_string(),
            })
    }
}

fn classify_transport_error(err: reqwest::Error) -> RemoteFailure {
    if err.is_timeout() {
        RemoteFailure::Timeout(CLIENT_TIMEOUT)
    } else {
        RemoteFailure::NetworkFailure(err.to_string())
    }
}

/// Maps a non-success HTTP status to the failure taxonomy.
fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> RemoteFailure {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteFailure::AuthFailure { message },
        StatusCode::TOO_MANY_REQUESTS => RemoteFailure::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            RemoteFailure::Timeout(Duration::ZERO)
        }
        _ => RemoteFailure::ServiceError {
            status: Some(status.as_u16()),
            message,
        },
    }
}
