//! Document ingestion pipeline.
//!
//! A run moves a document from `uploading` through `processing` to `completed` or `error`:
//! text extraction, then classification, then embedding, relationship detection and insight
//! generation side by side. External services are optional; every stage that depends on one
//! has a deterministic local stand-in, and the per-stage outcome is returned in
//! [`Diagnostics`].

pub mod classify;
pub mod extract;
pub mod facts;
pub mod index;
pub mod insights;
pub mod relate;
pub mod rules;
pub mod sanitize;
pub mod service;
pub mod types;

pub use classify::{Classification, ContentClassifier};
pub use extract::{Extraction, TextExtractor};
pub use index::{EmbeddingIndexer, IndexOutcome};
pub use insights::{INSIGHT_RULES, InsightContext, InsightDraft, InsightGenerator, InsightRule};
pub use relate::{RelationshipDetector, jaccard};
pub use rules::{DOCUMENT_RULES, DocumentRule};
pub use service::{Pipeline, PipelineApi, PipelineComponents};
pub use types::{
    Diagnostics, PipelineError, PipelineReport, PipelineSettings, ResultSource, StageStatus,
};
