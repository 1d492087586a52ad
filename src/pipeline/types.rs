//! Settings, stage errors and diagnostics shared by the pipeline stages.

use crate::{
    completion::CompletionClientError,
    embedding::EmbeddingClientError,
    ocr::OcrClientError,
    store::{DocumentStatus, Level, ProcessingQuality, StoreError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thresholds and limits consumed by the stages.
///
/// The defaults carry the values the pipeline has always used; none of them has a derivation
/// beyond "works for a personal vault", so they stay configurable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineSettings {
    /// Extractions below this confidence skip classification and embedding.
    pub ocr_confidence_gate: u8,
    /// Confidence assigned to fallback extractions (at most 85).
    pub fallback_ocr_confidence: u8,
    /// Similarity strictly above this records a `duplicate`.
    pub duplicate_threshold: f64,
    /// Similarity strictly above this (and not a duplicate) records a `related` link.
    pub related_threshold: f64,
    /// Characters of text sent to the embedding service.
    pub embedding_max_chars: usize,
    /// Characters of text sent to the completion service.
    pub classifier_max_chars: usize,
    /// Days before expiry on which auto-generated reminders fire.
    pub reminder_lead_days: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ocr_confidence_gate: 50,
            fallback_ocr_confidence: 85,
            duplicate_threshold: 0.8,
            related_threshold: 0.5,
            embedding_max_chars: 8_000,
            classifier_max_chars: 12_000,
            reminder_lead_days: 30,
        }
    }
}

/// Where a stage result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Produced by the external service.
    Live,
    /// Produced by the deterministic local stand-in.
    Fallback,
}

/// Expiry details attached to a classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryInfo {
    /// Whether the document expires at all.
    #[serde(default)]
    pub has_expiry: bool,
    /// Expiry date, `YYYY-MM-DD` or `DD/MM/YYYY`.
    #[serde(default)]
    pub expiry_date: Option<String>,
    /// Days remaining as computed by the model, informational only.
    #[serde(default)]
    pub days_until_expiry: Option<i64>,
}

/// Risk assessment attached to a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Overall risk level.
    pub level: Level,
    /// Reasons behind the level.
    #[serde(default)]
    pub factors: Vec<String>,
}

/// OCR could not deliver usable text; recovered with the fallback extraction.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// No OCR endpoint is configured.
    #[error("OCR service not configured")]
    NotConfigured,
    /// The service call failed.
    #[error(transparent)]
    Service(#[from] OcrClientError),
    /// The service answered with blank text.
    #[error("OCR service returned no text")]
    EmptyText,
}

/// The completion could not be turned into a classification; recovered with rules.
#[derive(Debug, Error)]
pub enum ClassificationParseFailure {
    /// No completion endpoint is configured.
    #[error("completion service not configured")]
    NotConfigured,
    /// The completion call failed.
    #[error(transparent)]
    Service(#[from] CompletionClientError),
    /// The payload was not valid JSON for the pinned schema.
    #[error("malformed classification payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// The payload parsed but violated the schema (unknown category, empty summary).
    #[error("classification payload rejected: {0}")]
    InvalidPayload(String),
}

/// Embedding could not be produced or stored; retried on the next reprocess.
#[derive(Debug, Error)]
pub enum EmbeddingFailure {
    /// Embedding provider failed.
    #[error(transparent)]
    Provider(#[from] EmbeddingClientError),
    /// Provider returned no vector for the text.
    #[error("embedding provider returned no vector")]
    EmptyVector,
    /// Reading or writing the embedding row failed.
    #[error("embedding storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Candidate lookup or relationship writes failed.
#[derive(Debug, Error)]
#[error("relationship detection failed: {0}")]
pub struct RelationshipDetectionFailure(#[from] pub StoreError);

/// Histogram lookup or insight writes failed.
#[derive(Debug, Error)]
#[error("insight generation failed: {0}")]
pub struct InsightGenerationFailure(#[from] pub StoreError);

/// Failure that forces a document into `error`.
#[derive(Debug, Error)]
pub enum OrchestratorFailure {
    /// The document row does not exist.
    #[error("document {0} not found")]
    DocumentMissing(String),
    /// The store rejected a read or write on the document row.
    #[error("document store failure: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a pipeline invocation refuses to run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// This process is already running the pipeline for the document.
    #[error("document {0} is already being processed by this worker")]
    InFlight(String),
    /// The store reports the document as `processing` for another invocation.
    #[error("document {0} is already processing")]
    AlreadyProcessing(String),
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage was never reached.
    #[default]
    NotRun,
    /// The stage succeeded against its live service.
    Completed,
    /// The stage fell back to its local stand-in.
    Degraded(String),
    /// The stage was intentionally bypassed.
    Skipped(String),
    /// The stage failed; the document still continued.
    Failed(String),
}

impl StageStatus {
    /// True for outcomes that represent lost quality.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_) | Self::Failed(_))
    }
}

/// Per-stage record of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Text extraction outcome.
    pub extraction: StageStatus,
    /// Classification outcome.
    pub classification: StageStatus,
    /// Expiry reminder scheduling outcome.
    pub reminder: StageStatus,
    /// Embedding outcome.
    pub embedding: StageStatus,
    /// Relationship detection outcome.
    pub relationships: StageStatus,
    /// Insight generation outcome.
    pub insights: StageStatus,
    /// Relationship rows written during the run.
    pub relationships_recorded: usize,
    /// Insight rows written during the run.
    pub insights_recorded: usize,
    /// Reminder rows written during the run.
    pub reminders_recorded: usize,
    /// Quality marker written on completion.
    pub quality: Option<ProcessingQuality>,
    /// Reason recorded when the document ends in `error`.
    pub error: Option<String>,
}

impl Diagnostics {
    /// Number of stages that fell back or failed.
    pub fn degraded_stage_count(&self) -> usize {
        [
            &self.extraction,
            &self.classification,
            &self.reminder,
            &self.embedding,
            &self.relationships,
            &self.insights,
        ]
        .into_iter()
        .filter(|stage| stage.is_degraded())
        .count()
    }
}

/// Final status and diagnostics of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Document the run processed.
    pub document_id: String,
    /// Terminal status written to the store.
    pub status: DocumentStatus,
    /// Stage-by-stage outcome.
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_status_serializes_with_detail() {
        assert_eq!(
            serde_json::to_value(StageStatus::Degraded("ocr down".into())).expect("json"),
            json!({ "status": "degraded", "detail": "ocr down" })
        );
        assert_eq!(
            serde_json::to_value(StageStatus::Completed).expect("json"),
            json!({ "status": "completed" })
        );
    }

    #[test]
    fn degraded_count_includes_failures_but_not_skips() {
        let diagnostics = Diagnostics {
            extraction: StageStatus::Degraded("fallback".into()),
            classification: StageStatus::Skipped("gate".into()),
            embedding: StageStatus::Failed("boom".into()),
            ..Default::default()
        };
        assert_eq!(diagnostics.degraded_stage_count(), 2);
    }
}
