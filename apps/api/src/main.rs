mod config;
mod errors;
mod llm_client;
mod routes;
mod scoring;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{CompletionTransport, LlmClient, ModelTier};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume scorer v{}", env!("CARGO_PKG_VERSION"));

    let transport: Arc<dyn CompletionTransport> =
        Arc::new(LlmClient::new(config.openai_base_url.clone())?);

    if config.scoring.api_key.is_some() {
        info!(
            "Remote scoring enabled (model: {}, max attempts: {})",
            ModelTier::parse(&config.scoring.model).model_id(),
            config.scoring.max_attempts
        );
    } else if config.scoring.fallback_enabled {
        warn!("OPENAI_API_KEY not set; all resumes will be scored by keyword analysis");
    } else {
        warn!("OPENAI_API_KEY not set and fallback disabled; evaluation requests will be rejected");
    }

    let state = AppState {
        config: config.clone(),
        transport,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
