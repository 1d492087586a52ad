//! HTTP surface for docpipe.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents/:id/process` – Run the ingestion pipeline for an uploaded document and
//!   return its terminal status plus per-stage diagnostics. `?force=true` reprocesses a
//!   document left in `processing`. Answers `409 Conflict` when the document is already being
//!   processed.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::pipeline::{PipelineApi, PipelineError, PipelineReport};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/documents/:id/process", post(process_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Query string accepted by `POST /documents/:id/process`.
#[derive(Debug, Default, Deserialize)]
struct ProcessQuery {
    /// Take over a document already marked `processing`.
    #[serde(default)]
    force: bool,
}

/// Run the pipeline for one document.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
    Query(query): Query<ProcessQuery>,
) -> Result<Json<PipelineReport>, AppError>
where
    S: PipelineApi,
{
    let report = service.process_document(&document_id, query.force).await?;
    tracing::info!(
        document_id = %report.document_id,
        status = %report.status,
        force = query.force,
        "Process request completed"
    );
    Ok(Json(report))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: PipelineApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        documents_completed: snapshot.documents_completed,
        documents_failed: snapshot.documents_failed,
        documents_text_only: snapshot.documents_text_only,
        degraded_stages: snapshot.degraded_stages,
        refused_runs: snapshot.refused_runs,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    documents_completed: u64,
    documents_failed: u64,
    documents_text_only: u64,
    degraded_stages: u64,
    refused_runs: u64,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: "/documents/:id/process",
                description: "Extract, classify, embed and link an uploaded document. Add ?force=true to reprocess a document stuck in processing. Returns { \"document_id\", \"status\", \"diagnostics\" }.",
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
            },
        ],
    })
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::CONFLICT, self.0.to_string()).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{Diagnostics, PipelineApi, PipelineError, PipelineReport};
    use crate::store::DocumentStatus;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_process_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let process = commands
            .iter()
            .find(|cmd| cmd.name == "process_document")
            .expect("process command present");

        assert_eq!(process.method, "POST");
        assert_eq!(process.path, "/documents/:id/process");
        assert!(process.description.contains("force"));
    }

    #[tokio::test]
    async fn process_route_forwards_id_and_force_flag() {
        let service = Arc::new(StubPipeline::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/documents/doc-42/process?force=true")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["document_id"], "doc-42");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["diagnostics"]["extraction"]["status"], "completed");

        let calls = service.calls.lock().await.clone();
        assert_eq!(calls, vec![("doc-42".to_string(), true)]);
    }

    #[tokio::test]
    async fn refused_runs_map_to_conflict() {
        let service = Arc::new(StubPipeline::default());
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/documents/busy/process")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let app = create_router(Arc::new(StubPipeline::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["documents_completed"], 3);
        assert_eq!(json["refused_runs"], 0);
    }

    #[derive(Default)]
    struct StubPipeline {
        calls: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl PipelineApi for StubPipeline {
        async fn process_document(
            &self,
            document_id: &str,
            force: bool,
        ) -> Result<PipelineReport, PipelineError> {
            self.calls.lock().await.push((document_id.to_string(), force));
            if document_id == "busy" {
                return Err(PipelineError::AlreadyProcessing(document_id.to_string()));
            }
            Ok(PipelineReport {
                document_id: document_id.to_string(),
                status: DocumentStatus::Completed,
                diagnostics: Diagnostics {
                    extraction: crate::pipeline::StageStatus::Completed,
                    ..Default::default()
                },
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_completed: 3,
                ..Default::default()
            }
        }
    }
}
