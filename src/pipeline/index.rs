//! Embedding stage, idempotent per document and content hash.

use super::{sanitize::truncate_chars, types::EmbeddingFailure};
use crate::{
    embedding::EmbeddingClient,
    store::{
        DocumentStore, Embedding, compute_content_hash, current_timestamp_rfc3339,
        generate_record_id,
    },
};
use std::sync::Arc;

/// Result of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A new vector was stored.
    Indexed {
        /// Id of the embedding row.
        embedding_id: String,
    },
    /// The stored vector already covers this text.
    Skipped {
        /// Hash shared by the stored vector and the current text.
        content_hash: String,
    },
}

/// Embeds document text and keeps one embedding row per document.
pub struct EmbeddingIndexer {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn EmbeddingClient>,
    max_chars: usize,
}

impl EmbeddingIndexer {
    /// Build an indexer writing through `store`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn EmbeddingClient>,
        max_chars: usize,
    ) -> Self {
        Self {
            store,
            client,
            max_chars,
        }
    }

    /// Embed the first `max_chars` characters of `text` unless they are already embedded.
    pub async fn index(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IndexOutcome, EmbeddingFailure> {
        let truncated = truncate_chars(text, self.max_chars);
        let content_hash = compute_content_hash(truncated);

        if let Some(existing) = self.store.get_embedding(document_id).await?
            && existing.content_hash == content_hash
        {
            tracing::debug!(document_id, %content_hash, "Embedding up to date; skipping");
            return Ok(IndexOutcome::Skipped { content_hash });
        }

        let vector = self
            .client
            .generate_embeddings(vec![truncated.to_string()])
            .await?
            .into_iter()
            .next()
            .filter(|vector| !vector.is_empty())
            .ok_or(EmbeddingFailure::EmptyVector)?;

        let embedding = Embedding {
            id: generate_record_id(),
            document_id: document_id.to_string(),
            vector,
            content_hash,
            model_version: self.client.model_version(),
            created_at: current_timestamp_rfc3339(),
        };
        let embedding_id = self.store.upsert_embedding(&embedding).await?;
        tracing::info!(
            document_id,
            %embedding_id,
            dimension = embedding.vector.len(),
            model = %embedding.model_version,
            "Stored document embedding"
        );
        Ok(IndexOutcome::Indexed { embedding_id })
    }
}
