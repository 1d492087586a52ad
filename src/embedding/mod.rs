use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider answered with a payload we could not use.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Identifier recorded as the embedding's model version.
    fn model_version(&self) -> String;
}

/// Deterministic embedding client that hashes bytes into a fixed-size unit vector.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a deterministic embedding client producing `dimension`-sized vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }

    fn model_version(&self) -> String {
        format!("local-hash-{}", self.dimension)
    }
}

/// Client for OpenAI-compatible `/v1/embeddings` endpoints.
pub struct HttpEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Build a client for `model` served from `base_url`.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docpipe/embed")
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let mut builder = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to reach embedding provider at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        if body.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} vectors, got {}",
                body.data.len()
            )));
        }
        Ok(body.data.into_iter().map(|datum| datum.embedding).collect())
    }

    fn model_version(&self) -> String {
        self.model.clone()
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(config: &Config) -> Box<dyn EmbeddingClient> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Selecting embedding client"
    );
    match (config.embedding_provider, config.embedding_url.clone()) {
        (EmbeddingProvider::OpenAI, Some(base_url)) => match HttpEmbeddingClient::new(
            base_url,
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ) {
            Ok(client) => Box::new(client),
            Err(error) => {
                tracing::warn!(error = %error, "Falling back to local hashing embeddings");
                Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
            }
        },
        (EmbeddingProvider::OpenAI, None) => {
            tracing::warn!("EMBEDDING_URL not set; falling back to local hashing embeddings");
            Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
        (EmbeddingProvider::Local, _) => {
            Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    }
}
