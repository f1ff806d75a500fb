//! Client for OpenAI-compatible `/v1/chat/completions` endpoints (non-streaming).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{ChatCompletion, CompletionOptions, LlmError};
use crate::config::LlmConfig;
use crate::pr::github::make_snippet;

/// Keeps a preconfigured `reqwest::Client` carrying the API key and timeout.
#[derive(Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    model: String,
    url_chat: String,
}

impl OpenAiClient {
    /// Validates the key and endpoint scheme, then builds the HTTP client.
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let endpoint = config.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(LlmError::InvalidEndpoint(config.endpoint.clone()));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| LlmError::InvalidApiKey)?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(LlmError::Transport)?;

        let url_chat = chat_url(endpoint);

        info!(
            model = %config.model,
            endpoint = %endpoint,
            timeout_secs = config.timeout_secs,
            "OpenAI client initialized"
        );

        Ok(Self {
            client,
            model: config.model.clone(),
            url_chat,
        })
    }
}

/// Accepts both `https://host` and `https://host/v1` style endpoints.
fn chat_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{}/v1/chat/completions", base)
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        debug!(
            model = %self.model,
            prompt_len = user.len(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let url = self.url_chat.clone();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);

            error!(
                %status,
                %url,
                %snippet,
                model = %self.model,
                latency_ms = started.elapsed().as_millis(),
                "chat completion returned non-success status"
            );

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited { url });
            }
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                url,
                snippet,
            });
        }

        let out: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(format!("{e}; expected `choices[0].message.content`")))?;

        let content = first_content(out)?;

        info!(
            model = %self.model,
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );

        Ok(content)
    }
}

fn first_content(out: ChatCompletionResponse) -> Result<String, LlmError> {
    out.choices
        .into_iter()
        .find_map(|c| c.message.content)
        .ok_or(LlmError::EmptyChoices)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::testing::serve;

    const CHAT_PATH: &str = "/v1/chat/completions";

    async fn client_for(app: Router) -> OpenAiClient {
        let config = LlmConfig {
            endpoint: serve(app).await,
            model: "gpt-test".to_string(),
            ..LlmConfig::default()
        };
        OpenAiClient::new(&config, "sk-test").unwrap()
    }

    async fn client_answering(status: StatusCode, body: &'static str) -> OpenAiClient {
        let app = Router::new().route(
            CHAT_PATH,
            post(move || async move {
                (status, [("content-type", "application/json")], body)
            }),
        );
        client_for(app).await
    }

    #[tokio::test]
    async fn test_complete_round_trip_over_http() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let app = Router::new()
            .route(
                CHAT_PATH,
                post(
                    |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                        *seen.lock().unwrap() = Some(body);
                        Json(json!({
                            "id": "chatcmpl-1",
                            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Adds a flag."}}]
                        }))
                    },
                ),
            )
            .with_state(seen.clone());
        let client = client_for(app).await;

        let reply = client
            .complete("sys", "user prompt", CompletionOptions::with_temperature(0.0))
            .await
            .unwrap();

        assert_eq!(reply, "Adds a flag.");
        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "sys"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "user prompt"}));
    }

    #[tokio::test]
    async fn test_server_error_is_http_status() {
        let client = client_answering(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"overloaded"}"#).await;
        let err = client
            .complete("s", "u", CompletionOptions::with_temperature(0.0))
            .await
            .unwrap_err();
        match err {
            LlmError::HttpStatus { status, snippet, .. } => {
                assert_eq!(status, 500);
                assert!(snippet.contains("overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let client = client_answering(StatusCode::TOO_MANY_REQUESTS, "{}").await;
        let err = client
            .complete("s", "u", CompletionOptions::with_temperature(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_empty_choices_over_http() {
        let client = client_answering(StatusCode::OK, r#"{"choices":[]}"#).await;
        let err = client
            .complete("s", "u", CompletionOptions::with_temperature(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyChoices), "{err:?}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let client = client_answering(StatusCode::OK, r#"{"result":"no choices key"}"#).await;
        let err = client
            .complete("s", "u", CompletionOptions::with_temperature(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)), "{err:?}");
    }

    #[test]
    fn test_chat_url_normalization() {
        assert_eq!(chat_url("https://api.openai.com"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(chat_url("https://api.openai.com/"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(chat_url("http://localhost:8080/v1"), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: vec![
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "hi" },
            ],
            temperature: 0.0,
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_first_content_skips_null_messages() {
        let out: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null}},{"message":{"content":"done"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(out).unwrap(), "done");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(empty), Err(LlmError::EmptyChoices)));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let config = LlmConfig {
            endpoint: "api.openai.com".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            OpenAiClient::new(&config, "sk-test"),
            Err(LlmError::InvalidEndpoint(_))
        ));
    }
}
