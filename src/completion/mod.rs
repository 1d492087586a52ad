//! Structured completions from an external language model.
//!
//! The classifier sends a fixed system prompt plus the document text and filename, and expects
//! a single JSON object back. This module only moves strings over the wire; validating the
//! payload against the schema is the classifier's job. The HTTP client targets the
//! OpenAI-compatible `/v1/chat/completions` route with JSON output mode enabled.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// Provider was unreachable or timed out.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Instruction pinning the output schema.
    pub system_prompt: String,
    /// Extracted document text (already truncated by the caller).
    pub document_text: String,
    /// Original filename, a strong hint for document type.
    pub filename: String,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the raw JSON payload produced by the model.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError>;
}

/// Build a completion client when an LLM endpoint is configured.
pub fn get_completion_client(config: &Config) -> Option<Box<dyn CompletionClient>> {
    let base_url = config.llm_url.clone()?;
    match ChatCompletionClient::new(
        base_url,
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(client) => Some(Box::new(client)),
        Err(error) => {
            tracing::warn!(error = %error, "Completion client unavailable; classification will use fallback");
            None
        }
    }
}

/// OpenAI-compatible chat completion client.
pub struct ChatCompletionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionClient {
    /// Build a client for `model` served from `base_url`.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self, CompletionClientError> {
        let http = Client::builder()
            .user_agent("docpipe/classify")
            .timeout(timeout)
            .build()
            .map_err(|error| CompletionClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                {
                    "role": "user",
                    "content": format!(
                        "Filename: {}\n\nDocument text:\n{}",
                        request.filename, request.document_text
                    )
                }
            ],
            "response_format": { "type": "json_object" },
            // Low temperature keeps categories stable across reprocessing.
            "temperature": 0.1,
        });

        let mut builder = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            CompletionClientError::ProviderUnavailable(format!(
                "failed to reach completion provider at {}: {error}",
                self.base_url
            ))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionClientError::ProviderUnavailable(format!(
                "completion endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CompletionClientError::InvalidResponse(format!(
                "failed to decode completion response: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                CompletionClientError::InvalidResponse("completion contained no content".into())
            })
    }
}
