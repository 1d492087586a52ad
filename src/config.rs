use crate::pipeline::PipelineSettings;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_LANGUAGE_HINTS: [&str; 8] = ["en", "hi", "ta", "te", "bn", "mr", "gu", "kn"];

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the REST document store (PostgREST / Supabase).
    pub store_url: String,
    /// Optional API key sent to the document store.
    pub store_api_key: Option<String>,
    /// Base URL of the object storage holding uploaded files (defaults to `store_url`).
    pub storage_url: String,
    /// Storage bucket containing uploaded documents.
    pub storage_bucket: String,
    /// OCR service endpoint; `None` means every extraction uses the local fallback.
    pub ocr_url: Option<String>,
    /// Optional API key for the OCR service.
    pub ocr_api_key: Option<String>,
    /// Language hints forwarded to the OCR service.
    pub ocr_language_hints: Vec<String>,
    /// LLM completion endpoint; `None` means classification uses the rule-based fallback.
    pub llm_url: Option<String>,
    /// Optional API key for the completion service.
    pub llm_api_key: Option<String>,
    /// Model identifier passed to the completion service.
    pub llm_model: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding endpoint used by the `openai` provider.
    pub embedding_url: Option<String>,
    /// Optional API key for the embedding service.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Timeout applied to every outbound HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Threshold and limit knobs consumed by the pipeline stages.
    pub pipeline: PipelineSettings,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing embeddings.
    Local,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_url = load_env("STORE_URL")?;
        let defaults = PipelineSettings::default();

        let fallback_ocr_confidence =
            parse_optional("FALLBACK_OCR_CONFIDENCE")?.unwrap_or(defaults.fallback_ocr_confidence);
        if fallback_ocr_confidence > 85 {
            return Err(ConfigError::InvalidValue(
                "FALLBACK_OCR_CONFIDENCE (must be at most 85)".into(),
            ));
        }

        let duplicate_threshold =
            parse_optional("DUPLICATE_THRESHOLD")?.unwrap_or(defaults.duplicate_threshold);
        let related_threshold =
            parse_optional("RELATED_THRESHOLD")?.unwrap_or(defaults.related_threshold);
        if !(0.0..=1.0).contains(&related_threshold) || related_threshold > duplicate_threshold {
            return Err(ConfigError::InvalidValue("RELATED_THRESHOLD".into()));
        }
        if !(0.0..=1.0).contains(&duplicate_threshold) {
            return Err(ConfigError::InvalidValue("DUPLICATE_THRESHOLD".into()));
        }

        let pipeline = PipelineSettings {
            ocr_confidence_gate: parse_optional("OCR_CONFIDENCE_GATE")?
                .unwrap_or(defaults.ocr_confidence_gate),
            fallback_ocr_confidence,
            duplicate_threshold,
            related_threshold,
            embedding_max_chars: parse_optional("EMBEDDING_MAX_CHARS")?
                .unwrap_or(defaults.embedding_max_chars),
            classifier_max_chars: parse_optional("CLASSIFIER_MAX_CHARS")?
                .unwrap_or(defaults.classifier_max_chars),
            reminder_lead_days: parse_optional("REMINDER_LEAD_DAYS")?
                .unwrap_or(defaults.reminder_lead_days),
        };

        Ok(Self {
            storage_url: load_env_optional("STORAGE_URL").unwrap_or_else(|| store_url.clone()),
            store_url,
            store_api_key: load_env_optional("STORE_API_KEY"),
            storage_bucket: load_env_optional("STORAGE_BUCKET")
                .unwrap_or_else(|| "documents".to_string()),
            ocr_url: load_env_optional("OCR_URL"),
            ocr_api_key: load_env_optional("OCR_API_KEY"),
            ocr_language_hints: load_env_optional("OCR_LANGUAGE_HINTS")
                .map(|value| parse_list(&value))
                .unwrap_or_else(|| {
                    DEFAULT_LANGUAGE_HINTS
                        .iter()
                        .map(|hint| hint.to_string())
                        .collect()
                }),
            llm_url: load_env_optional("LLM_URL"),
            llm_api_key: load_env_optional("LLM_API_KEY"),
            llm_model: load_env_optional("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Local),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".into()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(1536),
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            pipeline,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }

    /// Pipeline knobs derived from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        self.pipeline.clone()
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        store_url = %config.store_url,
        ocr_configured = config.ocr_url.is_some(),
        llm_configured = config.llm_url.is_some(),
        embedding_provider = ?config.embedding_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("local".parse(), Ok(EmbeddingProvider::Local));
        assert_eq!("ollama".parse::<EmbeddingProvider>(), Err(()));
    }

    #[test]
    fn language_hint_lists_are_trimmed_and_lowercased() {
        assert_eq!(parse_list(" EN, hi ,,ta"), vec!["en", "hi", "ta"]);
    }
}
