use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionTransport;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Model-service transport. Only used when `config.scoring.api_key` is set.
    pub transport: Arc<dyn CompletionTransport>,
}
