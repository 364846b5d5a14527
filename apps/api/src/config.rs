use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Application configuration loaded from environment variables.
/// Only the listen port and log level are process-level; everything the
/// scoring core consumes lives in `ScoringConfig` and is passed explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_base_url: String,
    pub scoring: ScoringConfig,
    pub port: u16,
    pub rust_log: String,
}

/// Settings consumed by the scoring engine for one batch.
///
/// `api_key = None` puts the engine in fallback-only mode: no remote attempt is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// `fast`, `quality`, or a literal model id.
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub timeout_seconds: f64,
    pub fallback_enabled: bool,
    /// Batch-level deadline. In-flight resumes past it are scored by the fallback scorer.
    pub batch_deadline_seconds: Option<f64>,
    pub max_concurrency: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: "fast".to_string(),
            api_key: None,
            max_attempts: 3,
            timeout_seconds: 30.0,
            fallback_enabled: true,
            batch_deadline_seconds: None,
            max_concurrency: 4,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = ScoringConfig::default();

        let scoring = ScoringConfig {
            model: std::env::var("SCORER_MODEL").unwrap_or(defaults.model),
            api_key: optional_env("OPENAI_API_KEY"),
            max_attempts: parse_env("SCORER_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            timeout_seconds: parse_env("SCORER_TIMEOUT_SECS", defaults.timeout_seconds)?,
            fallback_enabled: parse_env("SCORER_FALLBACK_ENABLED", defaults.fallback_enabled)?,
            batch_deadline_seconds: optional_env("SCORER_BATCH_DEADLINE_SECS")
                .map(|v| {
                    v.parse::<f64>()
                        .context("SCORER_BATCH_DEADLINE_SECS must be a number of seconds")
                })
                .transpose()?,
            max_concurrency: parse_env("SCORER_MAX_CONCURRENCY", defaults.max_concurrency)?.max(1),
        };

        Ok(Config {
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            scoring,
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Reads a variable, treating empty values as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
