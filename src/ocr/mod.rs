//! Client for the external OCR service.
//!
//! The service receives a fetchable document URI plus language hints and answers with the
//! recognized text and the language it saw on each page. Any failure here is recoverable: the
//! text extractor swaps in its deterministic fallback instead.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while calling the OCR service.
#[derive(Debug, Error)]
pub enum OcrClientError {
    /// Service could not be reached or timed out.
    #[error("OCR service unavailable: {0}")]
    ProviderUnavailable(String),
    /// Service answered with a non-success status.
    #[error("OCR request failed: {0}")]
    RecognitionFailed(String),
    /// Response body did not match the expected shape.
    #[error("Malformed OCR response: {0}")]
    InvalidResponse(String),
}

/// Request body sent to the OCR service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    /// URI of the image or document to recognize.
    pub image_or_doc_uri: String,
    /// Languages the service should try, most likely first.
    pub language_hints: Vec<String>,
}

/// Response body returned by the OCR service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    /// Recognized text; may be empty.
    #[serde(default)]
    pub text: String,
    /// Language code detected on each page.
    #[serde(default)]
    pub per_page_languages: Vec<String>,
}

/// Interface implemented by OCR backends.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Recognize the text of the document at `request.image_or_doc_uri`.
    async fn recognize(&self, request: OcrRequest) -> Result<OcrResponse, OcrClientError>;
}

/// Build an OCR client when the service is configured.
pub fn get_ocr_client(config: &Config) -> Option<Box<dyn OcrClient>> {
    let base_url = config.ocr_url.clone()?;
    match HttpOcrClient::new(
        base_url,
        config.ocr_api_key.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(client) => Some(Box::new(client)),
        Err(error) => {
            tracing::warn!(error = %error, "OCR client unavailable; extraction will use fallback");
            None
        }
    }
}

/// OCR client issuing JSON requests over HTTP.
pub struct HttpOcrClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOcrClient {
    /// Build a client for the service rooted at `base_url`.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, OcrClientError> {
        let http = Client::builder()
            .user_agent("docpipe/ocr")
            .timeout(timeout)
            .build()
            .map_err(|error| OcrClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/ocr", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn recognize(&self, request: OcrRequest) -> Result<OcrResponse, OcrClientError> {
        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            OcrClientError::ProviderUnavailable(format!(
                "failed to reach OCR service at {}: {error}",
                self.base_url
            ))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OcrClientError::ProviderUnavailable(format!(
                "OCR endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrClientError::RecognitionFailed(format!(
                "OCR service returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|error| {
            OcrClientError::InvalidResponse(format!("failed to decode OCR response: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> HttpOcrClient {
        HttpOcrClient::new(server.base_url(), Some("ocr-key".into()), Duration::from_secs(5))
            .expect("client")
    }

    #[tokio::test]
    async fn recognize_sends_uri_and_language_hints() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ocr")
                    .header("authorization", "Bearer ocr-key")
                    .json_body(json!({
                        "imageOrDocUri": "https://files.example/scan.png",
                        "languageHints": ["en", "hi"]
                    }));
                then.status(200).json_body(json!({
                    "text": "PERMANENT ACCOUNT NUMBER",
                    "perPageLanguages": ["en"]
                }));
            })
            .await;

        let response = client(&server)
            .recognize(OcrRequest {
                image_or_doc_uri: "https://files.example/scan.png".into(),
                language_hints: vec!["en".into(), "hi".into()],
            })
            .await
            .expect("ocr response");

        mock.assert_async().await;
        assert_eq!(response.text, "PERMANENT ACCOUNT NUMBER");
        assert_eq!(response.per_page_languages, vec!["en".to_string()]);
    }

    #[tokio::test]
    async fn server_errors_map_to_recognition_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ocr");
                then.status(500).body("engine crashed");
            })
            .await;

        let error = client(&server)
            .recognize(OcrRequest {
                image_or_doc_uri: "https://files.example/scan.png".into(),
                language_hints: vec![],
            })
            .await
            .expect_err("error response");

        assert!(
            matches!(error, OcrClientError::RecognitionFailed(ref message) if message.contains("500"))
        );
    }
}
