//! Records exchanged with the document store and the errors it can raise.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors returned while interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The store responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A row expected by the caller does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
    /// The file reference attached to a document cannot be turned into a URI.
    #[error("Unresolvable file reference: {0}")]
    UnresolvableFile(String),
}

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Created by the upload collaborator, not yet picked up.
    Uploading,
    /// Claimed by a pipeline invocation.
    Processing,
    /// Pipeline finished, possibly with degraded stages.
    Completed,
    /// Pipeline failed; `processing_error` carries the reason.
    Error,
}

impl DocumentStatus {
    /// Lowercase wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether no further automatic transition is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of categories a document can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Aadhaar, PAN, passport, driving licence and similar.
    Identity,
    /// Bank statements, salary slips, investments.
    Financial,
    /// Health, motor, life and property policies.
    Insurance,
    /// Prescriptions, lab reports, discharge summaries.
    Medical,
    /// Contracts, affidavits, court papers.
    Legal,
    /// Deeds, rental agreements, property tax receipts.
    Property,
    /// Certificates, mark sheets, transcripts.
    Education,
    /// Income tax returns, Form 16, GST filings.
    Tax,
    /// Anything that does not fit the other buckets.
    Other,
}

impl Category {
    /// Every category in declaration order.
    pub const ALL: [Category; 9] = [
        Self::Identity,
        Self::Financial,
        Self::Insurance,
        Self::Medical,
        Self::Legal,
        Self::Property,
        Self::Education,
        Self::Tax,
        Self::Other,
    ];

    /// Canonical display name, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "Identity",
            Self::Financial => "Financial",
            Self::Insurance => "Insurance",
            Self::Medical => "Medical",
            Self::Legal => "Legal",
            Self::Property => "Property",
            Self::Education => "Education",
            Self::Tax => "Tax",
            Self::Other => "Other",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(value: &str) -> Option<Self> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(needle))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured facts pulled out of a document's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFacts {
    /// Dates mentioned in the document, as written.
    pub dates: Vec<String>,
    /// Monetary amounts, including labelled amounts such as closing balances.
    pub amounts: Vec<String>,
    /// Account, policy and identity numbers.
    pub identifiers: Vec<String>,
    /// People and organisations named in the document.
    pub names: Vec<String>,
    /// Postal addresses.
    pub addresses: Vec<String>,
}

impl KeyFacts {
    /// True when no fact of any kind was captured.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.amounts.is_empty()
            && self.identifiers.is_empty()
            && self.names.is_empty()
            && self.addresses.is_empty()
    }
}

/// Quality marker written alongside a completed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingQuality {
    /// Every stage ran.
    Full,
    /// OCR confidence was below the gate; only the raw text is trustworthy.
    TextOnly,
}

/// Document row as stored by the upload collaborator and enriched by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Storage object path or absolute URL of the uploaded file.
    pub file_ref: String,
    /// Original filename supplied at upload time.
    #[serde(default)]
    pub file_name: String,
    /// Lifecycle state.
    pub status: DocumentStatus,
    /// Raw text produced by the extractor.
    #[serde(default)]
    pub extracted_text: Option<String>,
    /// Extraction confidence, 0–100.
    #[serde(default)]
    pub ocr_confidence: Option<u8>,
    /// Dominant language code reported for the text.
    #[serde(default)]
    pub language_detected: Option<String>,
    /// Category assigned by the classifier.
    #[serde(default)]
    pub category: Option<Category>,
    /// One-paragraph summary produced by the classifier.
    #[serde(default)]
    pub ai_summary: Option<String>,
    /// Classifier confidence, 0–100.
    #[serde(default)]
    pub ai_confidence: Option<u8>,
    /// Normalized tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Structured facts extracted by the classifier.
    #[serde(default)]
    pub key_facts: Option<KeyFacts>,
    /// Human-readable reason recorded when the pipeline fails.
    #[serde(default)]
    pub processing_error: Option<String>,
    /// Quality marker for completed documents.
    #[serde(default)]
    pub quality: Option<ProcessingQuality>,
    /// Creation timestamp (RFC 3339).
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp (RFC 3339).
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Document {
    /// Build a freshly uploaded document row.
    pub fn new_upload(
        id: impl Into<String>,
        user_id: impl Into<String>,
        file_ref: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            file_ref: file_ref.into(),
            file_name: file_name.into(),
            status: DocumentStatus::Uploading,
            extracted_text: None,
            ocr_confidence: None,
            language_detected: None,
            category: None,
            ai_summary: None,
            ai_confidence: None,
            tags: Vec::new(),
            key_facts: None,
            processing_error: None,
            quality: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Extracted text, if present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// Partial update applied to a document row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// New lifecycle state.
    pub status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Extracted text.
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Extraction confidence.
    pub ocr_confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detected language.
    pub language_detected: Option<String>,
    /// Assigned category; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<Category>>,
    /// Summary text; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<Option<String>>,
    /// Classifier confidence; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<Option<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
    /// Replacement key facts; `Some(None)` clears them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_facts: Option<Option<KeyFacts>>,
    /// `Some(None)` clears a previously recorded failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Quality marker.
    pub quality: Option<ProcessingQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Update timestamp.
    pub updated_at: Option<String>,
}

impl DocumentUpdate {
    /// Update that removes every classifier-derived field from the row.
    pub fn clear_classification() -> Self {
        Self {
            category: Some(None),
            ai_summary: Some(None),
            ai_confidence: Some(None),
            tags: Some(Vec::new()),
            key_facts: Some(None),
            ..Default::default()
        }
    }

    /// Apply the populated fields to an in-memory row.
    pub fn apply_to(&self, document: &mut Document) {
        if let Some(status) = self.status {
            document.status = status;
        }
        if let Some(text) = &self.extracted_text {
            document.extracted_text = Some(text.clone());
        }
        if let Some(confidence) = self.ocr_confidence {
            document.ocr_confidence = Some(confidence);
        }
        if let Some(language) = &self.language_detected {
            document.language_detected = Some(language.clone());
        }
        if let Some(category) = self.category {
            document.category = category;
        }
        if let Some(summary) = &self.ai_summary {
            document.ai_summary = summary.clone();
        }
        if let Some(confidence) = self.ai_confidence {
            document.ai_confidence = confidence;
        }
        if let Some(tags) = &self.tags {
            document.tags = tags.clone();
        }
        if let Some(facts) = &self.key_facts {
            document.key_facts = facts.clone();
        }
        if let Some(error) = &self.processing_error {
            document.processing_error = error.clone();
        }
        if let Some(quality) = self.quality {
            document.quality = Some(quality);
        }
        if let Some(updated_at) = &self.updated_at {
            document.updated_at = Some(updated_at.clone());
        }
    }
}

/// Row filter for [`crate::store::DocumentStore::list_documents`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Only return rows in this state.
    pub status: Option<DocumentStatus>,
    /// Leave out this document (usually the one being processed).
    pub exclude_id: Option<String>,
    /// Only return rows with non-blank extracted text.
    pub require_text: bool,
}

impl DocumentFilter {
    /// Completed documents other than `document_id` that carry text.
    pub fn completed_peers_of(document_id: &str) -> Self {
        Self {
            status: Some(DocumentStatus::Completed),
            exclude_id: Some(document_id.to_string()),
            require_text: true,
        }
    }

    /// Whether `document` passes the filter.
    pub fn matches(&self, document: &Document) -> bool {
        if let Some(status) = self.status
            && document.status != status
        {
            return false;
        }
        if let Some(excluded) = &self.exclude_id
            && &document.id == excluded
        {
            return false;
        }
        !self.require_text || document.text().is_some()
    }
}

/// Result of trying to move a document into `processing`.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The row was moved to `processing`; the claimed row is returned.
    Claimed(Box<Document>),
    /// Another invocation already holds the document.
    AlreadyProcessing,
    /// No row with that id exists.
    NotFound,
}

/// Kind of link recorded between two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    /// Near-identical content.
    Duplicate,
    /// Substantial overlap.
    Related,
}

impl RelationshipType {
    /// Lowercase wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Related => "related",
        }
    }
}

/// Directed storage of an undirected link between two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Primary key.
    pub id: String,
    /// Newly processed document.
    pub document_a_id: String,
    /// Existing document it was compared with.
    pub document_b_id: String,
    /// Duplicate or related.
    pub relationship_type: RelationshipType,
    /// Similarity expressed as 0–100.
    pub confidence_score: u8,
    /// Set for links produced by the pipeline rather than by a user.
    pub ai_detected: bool,
    /// Free-form detection details (method, raw score).
    #[serde(default)]
    pub metadata: Value,
}

/// Advisory category of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    /// Money-saving or coverage opportunity.
    Opportunity,
    /// Missing paperwork or regulatory exposure.
    Compliance,
    /// Risk to the user's identity or assets.
    Security,
    /// Housekeeping suggestion for the vault.
    Optimization,
}

/// Three-level scale shared by insight priority and reminder urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Informational.
    Low,
    /// Worth acting on soon.
    Medium,
    /// Needs attention.
    High,
}

/// Generated advisory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Advisory category.
    pub insight_type: InsightType,
    /// Short headline.
    pub title: String,
    /// Body text shown to the user.
    pub description: String,
    /// Display priority.
    pub priority: Level,
    /// Estimated savings, in rupees.
    #[serde(default)]
    pub savings_potential: Option<f64>,
    /// Suggested next step.
    #[serde(default)]
    pub action_required: Option<String>,
    /// Documents the insight refers to.
    #[serde(default)]
    pub related_document_ids: Vec<String>,
    /// Set by the UI once the user has seen it.
    #[serde(default)]
    pub acknowledged: bool,
}

/// Dated reminder shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Document the reminder was derived from.
    #[serde(default)]
    pub related_document_id: Option<String>,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Calendar date (`YYYY-MM-DD`) on which the reminder fires.
    pub reminder_date: String,
    /// Display urgency.
    pub urgency: Level,
    /// Set for reminders created by the pipeline.
    pub is_auto_generated: bool,
    /// Set by the UI once the user dismisses it.
    pub is_completed: bool,
}

/// Stored embedding for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Primary key.
    pub id: String,
    /// Owning document; one active embedding per document.
    pub document_id: String,
    /// Vector returned by the embedding service.
    pub vector: Vec<f32>,
    /// SHA-256 of the embedded text.
    pub content_hash: String,
    /// Model that produced the vector.
    pub model_version: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Audit entry appended once per pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Primary key.
    pub id: String,
    /// Owning user, when known.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Document the run processed.
    pub document_id: String,
    /// Machine-readable action name.
    pub action: String,
    /// Diagnostics snapshot for the run.
    #[serde(default)]
    pub details: Value,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_serializes_only_populated_fields() {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Completed),
            processing_error: Some(None),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).expect("serialize");
        assert_eq!(
            value,
            json!({ "status": "completed", "processing_error": null })
        );
    }

    #[test]
    fn clearing_classification_nulls_columns_and_rows() {
        let update = DocumentUpdate::clear_classification();
        let value = serde_json::to_value(&update).expect("serialize");
        assert_eq!(
            value,
            json!({
                "category": null,
                "ai_summary": null,
                "ai_confidence": null,
                "tags": [],
                "key_facts": null
            })
        );

        let mut document = Document::new_upload("doc-1", "u1", "u1/pan.jpg", "pan.jpg");
        document.category = Some(Category::Identity);
        document.ai_summary = Some("PAN card".into());
        document.ai_confidence = Some(95);
        document.tags = vec!["pan".into()];
        document.key_facts = Some(KeyFacts::default());
        update.apply_to(&mut document);

        assert!(document.category.is_none());
        assert!(document.ai_summary.is_none());
        assert!(document.ai_confidence.is_none());
        assert!(document.tags.is_empty());
        assert!(document.key_facts.is_none());
    }

    #[test]
    fn filter_skips_excluded_and_textless_rows() {
        let mut peer = Document::new_upload("b", "u1", "b.pdf", "b.pdf");
        peer.status = DocumentStatus::Completed;
        peer.extracted_text = Some("some text".into());
        let mut blank = peer.clone();
        blank.id = "c".into();
        blank.extracted_text = Some("   ".into());
        let mut me = peer.clone();
        me.id = "a".into();

        let filter = DocumentFilter::completed_peers_of("a");
        assert!(filter.matches(&peer));
        assert!(!filter.matches(&blank));
        assert!(!filter.matches(&me));
    }

    #[test]
    fn document_rows_tolerate_missing_optional_columns() {
        let row = json!({
            "id": "doc-1",
            "user_id": "user-1",
            "file_ref": "user-1/pan.jpg",
            "status": "uploading",
            "category": null
        });
        let document: Document = serde_json::from_value(row).expect("document");
        assert_eq!(document.status, DocumentStatus::Uploading);
        assert!(document.tags.is_empty());
        assert!(document.category.is_none());
    }
}
