//! HTTP client for a PostgREST-compatible document store (the Supabase REST surface).

use crate::config::Config;
use crate::store::{
    DocumentStore,
    payload::current_timestamp_rfc3339,
    types::{
        ActivityEntry, ClaimOutcome, Document, DocumentFilter, DocumentStatus, DocumentUpdate,
        Embedding, Insight, Relationship, RelationshipType, Reminder, StoreError,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DOCUMENTS: &str = "documents";
const RELATIONSHIPS: &str = "document_relationships";
const INSIGHTS: &str = "insights";
const REMINDERS: &str = "reminders";
const EMBEDDINGS: &str = "document_embeddings";
const ACTIVITY: &str = "activity_logs";

/// Lightweight HTTP client for the document store tables.
pub struct RestStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

impl RestStore {
    /// Construct a client from explicit connection settings.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent("docpipe/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized document store client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Construct a client using the store settings of `config`.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(
            &config.store_url,
            config.store_api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, &format!("rest/v1/{table}"));
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req
                .header("apikey", api_key)
                .header("Authorization", format!("Bearer {api_key}"));
        }
        req
    }

    async fn ensure_success(
        &self,
        table: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(table, error = %error, "Document store request failed");
            Err(error)
        }
    }

    async fn insert_row<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        self.ensure_success(table, response).await?;
        tracing::debug!(table, "Row inserted");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let response = self
            .request(Method::GET, DOCUMENTS)
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await?;
        let rows: Vec<Document> = self.ensure_success(DOCUMENTS, response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn claim_document(&self, id: &str, force: bool) -> Result<ClaimOutcome, StoreError> {
        let mut query = vec![("id", format!("eq.{id}"))];
        if !force {
            query.push((
                "status",
                format!("neq.{}", DocumentStatus::Processing.as_str()),
            ));
        }
        let body = json!({
            "status": DocumentStatus::Processing,
            "processing_error": null,
            "updated_at": current_timestamp_rfc3339(),
        });

        let response = self
            .request(Method::PATCH, DOCUMENTS)
            .query(&query)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<Document> = self.ensure_success(DOCUMENTS, response).await?.json().await?;

        if let Some(document) = rows.into_iter().next() {
            tracing::debug!(document_id = id, force, "Document claimed");
            return Ok(ClaimOutcome::Claimed(Box::new(document)));
        }

        // Zero rows matched: either the id is unknown or the status guard refused the claim.
        match self.get_document(id).await? {
            Some(_) if !force => Ok(ClaimOutcome::AlreadyProcessing),
            _ => Ok(ClaimOutcome::NotFound),
        }
    }

    async fn update_document(&self, id: &str, fields: &DocumentUpdate) -> Result<(), StoreError> {
        let response = self
            .request(Method::PATCH, DOCUMENTS)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(fields)
            .send()
            .await?;
        self.ensure_success(DOCUMENTS, response).await?;
        tracing::debug!(document_id = id, "Document updated");
        Ok(())
    }

    async fn list_documents(
        &self,
        user_id: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let mut query = vec![
            ("user_id", format!("eq.{user_id}")),
            ("select", "*".to_string()),
            ("order", "id.asc".to_string()),
        ];
        if let Some(status) = filter.status {
            query.push(("status", format!("eq.{}", status.as_str())));
        }
        if let Some(excluded) = &filter.exclude_id {
            query.push(("id", format!("neq.{excluded}")));
        }
        if filter.require_text {
            query.push(("extracted_text", "not.is.null".to_string()));
        }

        let response = self
            .request(Method::GET, DOCUMENTS)
            .query(&query)
            .send()
            .await?;
        let rows: Vec<Document> = self.ensure_success(DOCUMENTS, response).await?.json().await?;
        // Blank text cannot be expressed in the filter above.
        Ok(rows
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect())
    }

    async fn relationship_exists(
        &self,
        document_a_id: &str,
        document_b_id: &str,
        kind: RelationshipType,
    ) -> Result<bool, StoreError> {
        let pair = format!(
            "(and(document_a_id.eq.{a},document_b_id.eq.{b}),and(document_a_id.eq.{b},document_b_id.eq.{a}))",
            a = document_a_id,
            b = document_b_id
        );
        let response = self
            .request(Method::GET, RELATIONSHIPS)
            .query(&[
                ("select", "id".to_string()),
                ("relationship_type", format!("eq.{}", kind.as_str())),
                ("or", pair),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<IdRow> = self
            .ensure_success(RELATIONSHIPS, response)
            .await?
            .json()
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError> {
        self.insert_row(RELATIONSHIPS, relationship).await
    }

    async fn insert_insight(&self, insight: &Insight) -> Result<(), StoreError> {
        self.insert_row(INSIGHTS, insight).await
    }

    async fn auto_reminder_exists(
        &self,
        document_id: &str,
        reminder_date: &str,
    ) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, REMINDERS)
            .query(&[
                ("select", "id".to_string()),
                ("related_document_id", format!("eq.{document_id}")),
                ("reminder_date", format!("eq.{reminder_date}")),
                ("is_auto_generated", "is.true".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<IdRow> = self
            .ensure_success(REMINDERS, response)
            .await?
            .json()
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        self.insert_row(REMINDERS, reminder).await
    }

    async fn get_embedding(&self, document_id: &str) -> Result<Option<Embedding>, StoreError> {
        let response = self
            .request(Method::GET, EMBEDDINGS)
            .query(&[
                ("document_id", format!("eq.{document_id}")),
                ("select", "*".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<Embedding> = self
            .ensure_success(EMBEDDINGS, response)
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_embedding(&self, embedding: &Embedding) -> Result<String, StoreError> {
        let response = self
            .request(Method::POST, EMBEDDINGS)
            .query(&[("on_conflict", "document_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(embedding)
            .send()
            .await?;
        let rows: Vec<IdRow> = self
            .ensure_success(EMBEDDINGS, response)
            .await?
            .json()
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.id)
            .unwrap_or_else(|| embedding.id.clone()))
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.insert_row(ACTIVITY, entry).await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, PATCH, POST},
        MockServer,
    };

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(
            &server.base_url(),
            Some("service-key".into()),
            Duration::from_secs(5),
        )
        .expect("store")
    }

    fn document_row(status: &str) -> serde_json::Value {
        json!({
            "id": "doc-1",
            "user_id": "user-1",
            "file_ref": "user-1/statement.pdf",
            "file_name": "statement.pdf",
            "status": status,
            "tags": []
        })
    }

    #[tokio::test]
    async fn claim_sends_status_guard_and_returns_row() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/rest/v1/documents")
                    .query_param("id", "eq.doc-1")
                    .query_param("status", "neq.processing")
                    .header("apikey", "service-key")
                    .header("Prefer", "return=representation");
                then.status(200).json_body(json!([document_row("processing")]));
            })
            .await;

        let outcome = store(&server)
            .claim_document("doc-1", false)
            .await
            .expect("claim");

        mock.assert_async().await;
        match outcome {
            ClaimOutcome::Claimed(document) => {
                assert_eq!(document.status, DocumentStatus::Processing)
            }
            other => panic!("expected claim, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_claim_on_existing_row_reports_already_processing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/rest/v1/documents");
                then.status(200).json_body(json!([]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/documents")
                    .query_param("id", "eq.doc-1");
                then.status(200).json_body(json!([document_row("processing")]));
            })
            .await;

        let outcome = store(&server)
            .claim_document("doc-1", false)
            .await
            .expect("claim");
        assert!(matches!(outcome, ClaimOutcome::AlreadyProcessing));
    }

    #[tokio::test]
    async fn relationship_lookup_queries_both_directions() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/document_relationships")
                    .query_param("relationship_type", "eq.duplicate")
                    .query_param(
                        "or",
                        "(and(document_a_id.eq.a,document_b_id.eq.b),and(document_a_id.eq.b,document_b_id.eq.a))",
                    );
                then.status(200).json_body(json!([{ "id": "rel-1" }]));
            })
            .await;

        let exists = store(&server)
            .relationship_exists("a", "b", RelationshipType::Duplicate)
            .await
            .expect("lookup");

        mock.assert_async().await;
        assert!(exists);
    }

    #[tokio::test]
    async fn auto_reminder_lookup_filters_on_document_and_date() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/reminders")
                    .query_param("related_document_id", "eq.doc-1")
                    .query_param("reminder_date", "eq.2030-02-13")
                    .query_param("is_auto_generated", "is.true");
                then.status(200).json_body(json!([]));
            })
            .await;

        let exists = store(&server)
            .auto_reminder_exists("doc-1", "2030-02-13")
            .await
            .expect("lookup");

        mock.assert_async().await;
        assert!(!exists);
    }

    #[tokio::test]
    async fn insert_failures_surface_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rest/v1/activity_logs");
                then.status(503).body("maintenance");
            })
            .await;

        let error = store(&server)
            .append_activity(&ActivityEntry {
                id: "act-1".into(),
                user_id: Some("user-1".into()),
                document_id: "doc-1".into(),
                action: "document_processed".into(),
                details: json!({}),
                created_at: "2025-01-01T00:00:00Z".into(),
            })
            .await
            .expect_err("insert should fail");

        match error {
            StoreError::UnexpectedStatus { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_drops_rows_with_blank_text() {
        let server = MockServer::start_async().await;
        let mut with_text = document_row("completed");
        with_text["id"] = json!("doc-2");
        with_text["extracted_text"] = json!("hello world");
        let mut blank = document_row("completed");
        blank["id"] = json!("doc-3");
        blank["extracted_text"] = json!("  ");
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/rest/v1/documents")
                    .query_param("user_id", "eq.user-1")
                    .query_param("status", "eq.completed")
                    .query_param("id", "neq.doc-1")
                    .query_param("extracted_text", "not.is.null");
                then.status(200).json_body(json!([with_text.clone(), blank.clone()]));
            })
            .await;

        let rows = store(&server)
            .list_documents("user-1", &DocumentFilter::completed_peers_of("doc-1"))
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "doc-2");
    }
}
