//! Document store and file storage collaborators.
//!
//! The pipeline never talks to a database directly. Everything it reads or writes goes through
//! [`DocumentStore`], whose operations are atomic per row; no cross-row transactions are
//! needed. [`RestStore`] speaks PostgREST (the Supabase REST surface) and [`InMemoryStore`]
//! backs tests and local experiments.

pub mod client;
pub mod files;
pub mod memory;
pub mod payload;
pub mod types;

use async_trait::async_trait;

pub use client::RestStore;
pub use files::{FileResolver, PublicUrlResolver};
pub use memory::InMemoryStore;
pub use payload::{compute_content_hash, current_timestamp_rfc3339, generate_record_id};
pub use types::{
    ActivityEntry, Category, ClaimOutcome, Document, DocumentFilter, DocumentStatus,
    DocumentUpdate, Embedding, Insight, InsightType, KeyFacts, Level, ProcessingQuality,
    Relationship, RelationshipType, Reminder, StoreError,
};

/// Row-level operations the pipeline needs from the managed data store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Move a document into `processing`.
    ///
    /// Unless `force` is set, the transition only happens when the row is not already
    /// `processing`; this guarded write is the cross-process single-flight point.
    async fn claim_document(&self, id: &str, force: bool) -> Result<ClaimOutcome, StoreError>;

    /// Apply a partial update to a document row.
    async fn update_document(&self, id: &str, fields: &DocumentUpdate) -> Result<(), StoreError>;

    /// List a user's documents matching `filter`.
    async fn list_documents(
        &self,
        user_id: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>, StoreError>;

    /// Whether the unordered pair `(a, b)` already has a relationship of `kind`.
    async fn relationship_exists(
        &self,
        document_a_id: &str,
        document_b_id: &str,
        kind: RelationshipType,
    ) -> Result<bool, StoreError>;

    /// Insert a relationship row.
    async fn insert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError>;

    /// Insert an insight row.
    async fn insert_insight(&self, insight: &Insight) -> Result<(), StoreError>;

    /// Whether `document_id` already has an auto-generated reminder dated `reminder_date`.
    async fn auto_reminder_exists(
        &self,
        document_id: &str,
        reminder_date: &str,
    ) -> Result<bool, StoreError>;

    /// Insert a reminder row.
    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError>;

    /// Fetch the active embedding of a document.
    async fn get_embedding(&self, document_id: &str) -> Result<Option<Embedding>, StoreError>;

    /// Insert or replace the active embedding of `embedding.document_id`; returns its id.
    async fn upsert_embedding(&self, embedding: &Embedding) -> Result<String, StoreError>;

    /// Append an audit entry.
    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError>;
}
