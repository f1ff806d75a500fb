pub mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM provider rate limit exceeded ({url})")]
    RateLimited { url: String },

    #[error("LLM provider returned {status} for {url}: {snippet}")]
    HttpStatus {
        status: u16,
        url: String,
        snippet: String,
    },

    #[error("Malformed LLM response: {0}")]
    Decode(String),

    #[error("LLM response contained no choices")]
    EmptyChoices,

    #[error("LLM API key is missing or invalid")]
    InvalidApiKey,

    #[error("Invalid LLM endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Transport(err)
        }
    }
}

/// Sampling knobs for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }
}

/// A chat-style completion provider: one system message, one user message,
/// one text answer.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError>;
}
