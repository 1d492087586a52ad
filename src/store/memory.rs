//! In-process [`DocumentStore`] used by tests and local runs.

use crate::store::{
    DocumentStore,
    types::{
        ActivityEntry, ClaimOutcome, Document, DocumentFilter, DocumentStatus, DocumentUpdate,
        Embedding, Insight, Relationship, RelationshipType, Reminder, StoreError,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    relationships: Vec<Relationship>,
    insights: Vec<Insight>,
    reminders: Vec<Reminder>,
    embeddings: HashMap<String, Embedding>,
    activity: Vec<ActivityEntry>,
}

/// Document store holding every table in memory behind a single `RwLock`.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document row, as the upload collaborator would.
    pub async fn put_document(&self, document: Document) {
        self.tables
            .write()
            .await
            .documents
            .insert(document.id.clone(), document);
    }

    /// Snapshot of every relationship row.
    pub async fn relationships(&self) -> Vec<Relationship> {
        self.tables.read().await.relationships.clone()
    }

    /// Snapshot of every insight row.
    pub async fn insights(&self) -> Vec<Insight> {
        self.tables.read().await.insights.clone()
    }

    /// Snapshot of every reminder row.
    pub async fn reminders(&self) -> Vec<Reminder> {
        self.tables.read().await.reminders.clone()
    }

    /// Snapshot of every embedding row.
    pub async fn embeddings(&self) -> Vec<Embedding> {
        self.tables.read().await.embeddings.values().cloned().collect()
    }

    /// Snapshot of the activity log.
    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.tables.read().await.activity.clone()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.tables.read().await.documents.get(id).cloned())
    }

    async fn claim_document(&self, id: &str, force: bool) -> Result<ClaimOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(document) = tables.documents.get_mut(id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if !force && document.status == DocumentStatus::Processing {
            return Ok(ClaimOutcome::AlreadyProcessing);
        }
        document.status = DocumentStatus::Processing;
        document.processing_error = None;
        Ok(ClaimOutcome::Claimed(Box::new(document.clone())))
    }

    async fn update_document(&self, id: &str, fields: &DocumentUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let document = tables
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))?;
        fields.apply_to(document);
        Ok(())
    }

    async fn list_documents(
        &self,
        user_id: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|document| document.user_id == user_id && filter.matches(document))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    async fn relationship_exists(
        &self,
        document_a_id: &str,
        document_b_id: &str,
        kind: RelationshipType,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.relationships.iter().any(|row| {
            row.relationship_type == kind
                && ((row.document_a_id == document_a_id && row.document_b_id == document_b_id)
                    || (row.document_a_id == document_b_id && row.document_b_id == document_a_id))
        }))
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .relationships
            .push(relationship.clone());
        Ok(())
    }

    async fn insert_insight(&self, insight: &Insight) -> Result<(), StoreError> {
        self.tables.write().await.insights.push(insight.clone());
        Ok(())
    }

    async fn auto_reminder_exists(
        &self,
        document_id: &str,
        reminder_date: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.reminders.iter().any(|row| {
            row.is_auto_generated
                && row.reminder_date == reminder_date
                && row.related_document_id.as_deref() == Some(document_id)
        }))
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        self.tables.write().await.reminders.push(reminder.clone());
        Ok(())
    }

    async fn get_embedding(&self, document_id: &str) -> Result<Option<Embedding>, StoreError> {
        Ok(self.tables.read().await.embeddings.get(document_id).cloned())
    }

    async fn upsert_embedding(&self, embedding: &Embedding) -> Result<String, StoreError> {
        let mut tables = self.tables.write().await;
        let mut row = embedding.clone();
        if let Some(existing) = tables.embeddings.get(&embedding.document_id) {
            row.id = existing.id.clone();
        }
        let id = row.id.clone();
        tables.embeddings.insert(row.document_id.clone(), row);
        Ok(id)
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.tables.write().await.activity.push(entry.clone());
        Ok(())
    }
}
