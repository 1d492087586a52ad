//! Pipeline orchestrator sequencing extraction, classification and the fan-out stages.

use super::{
    classify::ContentClassifier,
    extract::TextExtractor,
    index::{EmbeddingIndexer, IndexOutcome},
    insights::{InsightGenerator, reminder_for_expiry},
    relate::RelationshipDetector,
    types::{
        Diagnostics, OrchestratorFailure, PipelineError, PipelineReport, PipelineSettings,
        ResultSource, StageStatus,
    },
};
use crate::{
    completion::{CompletionClient, get_completion_client},
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    metrics::{MetricsSnapshot, PipelineMetrics},
    ocr::{OcrClient, get_ocr_client},
    store::{
        ActivityEntry, ClaimOutcome, Document, DocumentStatus, DocumentStore, DocumentUpdate,
        FileResolver, ProcessingQuality, PublicUrlResolver, Reminder, RestStore, StoreError,
        current_timestamp_rfc3339, generate_record_id,
    },
};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

/// Collaborators and settings needed to assemble a [`Pipeline`].
pub struct PipelineComponents {
    /// Document store shared by every stage.
    pub store: Arc<dyn DocumentStore>,
    /// Resolves `file_ref` values into fetchable URIs.
    pub files: Arc<dyn FileResolver>,
    /// OCR service; `None` always uses fallback text.
    pub ocr: Option<Arc<dyn OcrClient>>,
    /// Completion service; `None` always uses the rule-based classifier.
    pub completion: Option<Arc<dyn CompletionClient>>,
    /// Embedding provider.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Language hints forwarded to OCR.
    pub language_hints: Vec<String>,
    /// Thresholds and limits.
    pub settings: PipelineSettings,
}

/// Runs documents through the ingestion pipeline.
///
/// One instance serves the whole process; share it through an `Arc`. Different documents run
/// concurrently, while a given document id is processed by at most one invocation at a time:
/// the in-process set below catches local duplicates and the store's guarded claim write
/// catches duplicates across processes.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    files: Arc<dyn FileResolver>,
    extractor: TextExtractor,
    classifier: ContentClassifier,
    indexer: EmbeddingIndexer,
    detector: RelationshipDetector,
    insights: InsightGenerator,
    settings: PipelineSettings,
    in_flight: Mutex<HashSet<String>>,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Run the pipeline for one document; `force` reprocesses a document stuck in `processing`.
    async fn process_document(
        &self,
        document_id: &str,
        force: bool,
    ) -> Result<PipelineReport, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

struct InFlightGuard<'a> {
    ids: &'a Mutex<HashSet<String>>,
    document_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(ids: &'a Mutex<HashSet<String>>, document_id: &str) -> Option<Self> {
        let inserted = ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.to_string());
        inserted.then(|| Self {
            ids,
            document_id: document_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.document_id);
    }
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(components: PipelineComponents) -> Self {
        let PipelineComponents {
            store,
            files,
            ocr,
            completion,
            embedder,
            language_hints,
            settings,
        } = components;

        Self {
            extractor: TextExtractor::new(ocr, language_hints, settings.fallback_ocr_confidence),
            classifier: ContentClassifier::new(completion, settings.classifier_max_chars),
            indexer: EmbeddingIndexer::new(store.clone(), embedder, settings.embedding_max_chars),
            detector: RelationshipDetector::new(
                store.clone(),
                settings.duplicate_threshold,
                settings.related_threshold,
            ),
            insights: InsightGenerator::new(store.clone()),
            store,
            files,
            settings,
            in_flight: Mutex::new(HashSet::new()),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Assemble a pipeline talking to the services named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        tracing::info!("Initializing pipeline collaborators");
        let store = RestStore::from_config(config)?;
        let files = PublicUrlResolver::new(&config.storage_url, &config.storage_bucket)?;
        let ocr: Option<Arc<dyn OcrClient>> = get_ocr_client(config).map(Arc::from);
        let completion: Option<Arc<dyn CompletionClient>> =
            get_completion_client(config).map(Arc::from);
        if ocr.is_none() {
            tracing::warn!("OCR_URL not set; every extraction will use fallback text");
        }
        if completion.is_none() {
            tracing::warn!("LLM_URL not set; every classification will use the rule table");
        }

        Ok(Self::new(PipelineComponents {
            store: Arc::new(store),
            files: Arc::new(files),
            ocr,
            completion,
            embedder: Arc::from(get_embedding_client(config)),
            language_hints: config.ocr_language_hints.clone(),
            settings: config.pipeline_settings(),
        }))
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process a freshly uploaded document.
    ///
    /// Refuses with [`PipelineError`] when the document is already processing; every other
    /// problem ends in a report whose status is `error`.
    pub async fn process(&self, document_id: &str) -> Result<PipelineReport, PipelineError> {
        self.run(document_id, false).await
    }

    /// Process a document again, taking over a row left in `processing`.
    pub async fn reprocess(&self, document_id: &str) -> Result<PipelineReport, PipelineError> {
        self.run(document_id, true).await
    }

    async fn run(&self, document_id: &str, force: bool) -> Result<PipelineReport, PipelineError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, document_id) else {
            tracing::warn!(document_id, "Document already in flight in this process");
            self.metrics.record_refusal();
            return Err(PipelineError::InFlight(document_id.to_string()));
        };
        tracing::info!(document_id, force, "Pipeline run started");

        let mut diagnostics = Diagnostics::default();
        let document = match self.store.claim_document(document_id, force).await {
            Ok(ClaimOutcome::Claimed(document)) => *document,
            Ok(ClaimOutcome::AlreadyProcessing) => {
                tracing::warn!(document_id, "Document already processing elsewhere");
                self.metrics.record_refusal();
                return Err(PipelineError::AlreadyProcessing(document_id.to_string()));
            }
            Ok(ClaimOutcome::NotFound) => {
                let failure = OrchestratorFailure::DocumentMissing(document_id.to_string());
                return Ok(self.fail(document_id, None, failure, diagnostics).await);
            }
            Err(error) => {
                let failure = OrchestratorFailure::Store(error);
                return Ok(self.fail(document_id, None, failure, diagnostics).await);
            }
        };

        let report = match self.run_stages(&document, &mut diagnostics).await {
            Ok(()) => {
                self.finish(&document, DocumentStatus::Completed, diagnostics)
                    .await
            }
            Err(failure) => {
                self.fail(document_id, Some(&document.user_id), failure, diagnostics)
                    .await
            }
        };
        Ok(report)
    }

    async fn run_stages(
        &self,
        document: &Document,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), OrchestratorFailure> {
        let document_id = document.id.as_str();
        let uri = self.files.resolve(&document.file_ref)?;

        let extraction = self.extractor.extract(&uri, &document.file_name).await;
        diagnostics.extraction = match &extraction.failure {
            None => StageStatus::Completed,
            Some(failure) => StageStatus::Degraded(failure.to_string()),
        };
        self.store
            .update_document(
                document_id,
                &DocumentUpdate {
                    extracted_text: Some(extraction.text.clone()),
                    ocr_confidence: Some(extraction.confidence),
                    language_detected: Some(extraction.language.clone()),
                    updated_at: Some(current_timestamp_rfc3339()),
                    ..Default::default()
                },
            )
            .await?;

        if extraction.confidence < self.settings.ocr_confidence_gate {
            let reason = format!(
                "OCR confidence {} below gate {}",
                extraction.confidence, self.settings.ocr_confidence_gate
            );
            tracing::info!(document_id, %reason, "Skipping classification and embedding");
            diagnostics.classification = StageStatus::Skipped(reason.clone());
            diagnostics.reminder = StageStatus::Skipped(reason.clone());
            diagnostics.embedding = StageStatus::Skipped(reason.clone());
            diagnostics.relationships = StageStatus::Skipped(reason.clone());
            diagnostics.insights = StageStatus::Skipped(reason);
            self.store
                .update_document(
                    document_id,
                    &DocumentUpdate {
                        updated_at: Some(current_timestamp_rfc3339()),
                        ..DocumentUpdate::clear_classification()
                    },
                )
                .await?;
            return self
                .complete(document_id, ProcessingQuality::TextOnly, diagnostics)
                .await;
        }

        let classification = self
            .classifier
            .classify(&extraction.text, &document.file_name)
            .await;
        diagnostics.classification = match &classification.failure {
            None => StageStatus::Completed,
            Some(failure) => StageStatus::Degraded(failure.to_string()),
        };
        self.store
            .update_document(
                document_id,
                &DocumentUpdate {
                    category: Some(Some(classification.category)),
                    ai_summary: Some(Some(classification.summary.clone())),
                    ai_confidence: Some(Some(classification.confidence)),
                    tags: Some(classification.tags.clone()),
                    key_facts: Some(
                        (!classification.key_facts.is_empty())
                            .then(|| classification.key_facts.clone()),
                    ),
                    updated_at: Some(current_timestamp_rfc3339()),
                    ..Default::default()
                },
            )
            .await?;

        diagnostics.reminder = match classification.expiry_date() {
            Some(expiry) => {
                let reminder = reminder_for_expiry(
                    &document.user_id,
                    document_id,
                    &document.file_name,
                    expiry,
                    self.settings.reminder_lead_days,
                );
                match self.schedule_reminder(&reminder).await {
                    Ok(true) => {
                        tracing::info!(document_id, date = %reminder.reminder_date, "Expiry reminder scheduled");
                        diagnostics.reminders_recorded = 1;
                        StageStatus::Completed
                    }
                    Ok(false) => StageStatus::Skipped(format!(
                        "reminder for {} already scheduled",
                        reminder.reminder_date
                    )),
                    Err(error) => {
                        tracing::warn!(document_id, error = %error, "Failed to store expiry reminder");
                        StageStatus::Failed(error.to_string())
                    }
                }
            }
            None => StageStatus::Skipped("no expiry date".to_string()),
        };

        // Fallback text is a rule template shared by every document of a type.
        let relate = async {
            match extraction.source {
                ResultSource::Live => Some(
                    self.detector
                        .detect(document_id, &document.user_id, &extraction.text)
                        .await,
                ),
                ResultSource::Fallback => None,
            }
        };
        let (indexed, related, insights) = tokio::join!(
            self.indexer.index(document_id, &extraction.text),
            relate,
            self.insights.generate(
                &document.user_id,
                document_id,
                classification.category,
                classification.risk_assessment.as_ref(),
            ),
        );

        diagnostics.embedding = match indexed {
            Ok(IndexOutcome::Indexed { .. }) => StageStatus::Completed,
            Ok(IndexOutcome::Skipped { .. }) => {
                StageStatus::Skipped("content hash unchanged".to_string())
            }
            Err(error) => {
                tracing::warn!(document_id, error = %error, "Embedding stage failed");
                StageStatus::Failed(error.to_string())
            }
        };
        diagnostics.relationships = match related {
            None => StageStatus::Skipped("fallback text".to_string()),
            Some(Ok(recorded)) => {
                diagnostics.relationships_recorded = recorded.len();
                StageStatus::Completed
            }
            Some(Err(error)) => {
                tracing::warn!(document_id, error = %error, "Relationship stage failed");
                StageStatus::Failed(error.to_string())
            }
        };
        diagnostics.insights = match insights {
            Ok(generated) => {
                diagnostics.insights_recorded = generated.len();
                StageStatus::Completed
            }
            Err(error) => {
                tracing::warn!(document_id, error = %error, "Insight stage failed");
                StageStatus::Failed(error.to_string())
            }
        };

        self.complete(document_id, ProcessingQuality::Full, diagnostics)
            .await
    }

    /// Insert `reminder` unless the document already has it; returns whether a row was written.
    async fn schedule_reminder(&self, reminder: &Reminder) -> Result<bool, StoreError> {
        if let Some(document_id) = reminder.related_document_id.as_deref()
            && self
                .store
                .auto_reminder_exists(document_id, &reminder.reminder_date)
                .await?
        {
            return Ok(false);
        }
        self.store.insert_reminder(reminder).await?;
        Ok(true)
    }

    async fn complete(
        &self,
        document_id: &str,
        quality: ProcessingQuality,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), OrchestratorFailure> {
        self.store
            .update_document(
                document_id,
                &DocumentUpdate {
                    status: Some(DocumentStatus::Completed),
                    quality: Some(quality),
                    processing_error: Some(None),
                    updated_at: Some(current_timestamp_rfc3339()),
                    ..Default::default()
                },
            )
            .await?;
        diagnostics.quality = Some(quality);
        Ok(())
    }

    /// Force the row into `error`, then log and report the failed run.
    async fn fail(
        &self,
        document_id: &str,
        user_id: Option<&str>,
        failure: OrchestratorFailure,
        mut diagnostics: Diagnostics,
    ) -> PipelineReport {
        let reason = failure.to_string();
        tracing::error!(document_id, error = %reason, "Pipeline run failed");

        if !matches!(failure, OrchestratorFailure::DocumentMissing(_)) {
            let update = DocumentUpdate {
                status: Some(DocumentStatus::Error),
                processing_error: Some(Some(reason.clone())),
                updated_at: Some(current_timestamp_rfc3339()),
                ..Default::default()
            };
            if let Err(error) = self.store.update_document(document_id, &update).await {
                tracing::error!(document_id, error = %error, "Could not record processing error");
            }
        }

        diagnostics.quality = None;
        diagnostics.error = Some(reason);
        self.record(document_id, user_id, DocumentStatus::Error, diagnostics)
            .await
    }

    async fn finish(
        &self,
        document: &Document,
        status: DocumentStatus,
        diagnostics: Diagnostics,
    ) -> PipelineReport {
        self.record(&document.id, Some(&document.user_id), status, diagnostics)
            .await
    }

    async fn record(
        &self,
        document_id: &str,
        user_id: Option<&str>,
        status: DocumentStatus,
        diagnostics: Diagnostics,
    ) -> PipelineReport {
        let action = match status {
            DocumentStatus::Completed => "document_processed",
            _ => "document_processing_failed",
        };
        let entry = ActivityEntry {
            id: generate_record_id(),
            user_id: user_id.map(str::to_string),
            document_id: document_id.to_string(),
            action: action.to_string(),
            details: serde_json::to_value(&diagnostics).unwrap_or_default(),
            created_at: current_timestamp_rfc3339(),
        };
        if let Err(error) = self.store.append_activity(&entry).await {
            tracing::warn!(document_id, error = %error, "Failed to append activity entry");
        }

        let degraded = diagnostics.degraded_stage_count();
        self.metrics
            .record_run(status, diagnostics.quality, degraded);
        tracing::info!(
            document_id,
            status = %status,
            degraded_stages = degraded,
            relationships = diagnostics.relationships_recorded,
            insights = diagnostics.insights_recorded,
            "Pipeline run finished"
        );

        PipelineReport {
            document_id: document_id.to_string(),
            status,
            diagnostics,
        }
    }
}

#[async_trait]
impl PipelineApi for Pipeline {
    async fn process_document(
        &self,
        document_id: &str,
        force: bool,
    ) -> Result<PipelineReport, PipelineError> {
        if force {
            self.reprocess(document_id).await
        } else {
            self.process(document_id).await
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
