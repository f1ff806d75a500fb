pub mod error;
pub mod signature;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::jobs::{JobContext, JobQueue, TokioJobQueue};
use crate::llm::OpenAiClient;
use crate::pr::{clients_from_config, GitHubClients};
use crate::summary::{Summarizer, SummarizerSettings};
use error::AppError;

/// Shared state for the webhook handlers.
pub struct AppState {
    pub webhook_secret: String,
    pub github: Arc<dyn GitHubClients>,
    pub jobs: Arc<dyn JobQueue>,
}

impl AppState {
    /// Wire the real GitHub and OpenAI clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        config.validate_for_server()?;

        let github = clients_from_config(&config.github, config.github_auth()?)?;
        let llm = Arc::new(OpenAiClient::new(&config.llm, config.llm_api_key()?)?);
        let summarizer = Summarizer::new(
            llm,
            SummarizerSettings::from_config(&config.summary, &config.llm),
        );

        let ctx = JobContext {
            github: github.clone(),
            summarizer: Arc::new(summarizer),
            max_files: config.summary.max_files,
        };

        Ok(Self {
            webhook_secret: config.webhook_secret()?.to_string(),
            github,
            jobs: Arc::new(TokioJobQueue::new(Arc::new(ctx))),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook::handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Bind and serve until Ctrl+C.
pub async fn start(config: &Config) -> Result<(), AppError> {
    let state = Arc::new(AppState::from_config(config)?);
    let addr = config.server.addr.clone();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, max_files = config.summary.max_files, "listening for GitHub webhooks");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let abandoned = state.jobs.shutdown(grace).await;
    info!(abandoned = abandoned.len(), "server stopped");
    Ok(())
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
