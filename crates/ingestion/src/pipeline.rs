//! Document processing pipeline
//!
//! Claim a `pending` document, run extraction → sanitization → entity
//! extraction → metadata derivation and merge, then persist the terminal
//! state. CPU-bound stages run on the blocking pool.

use crate::entities::EntityExtractor;
use crate::errors::IngestionError;
use crate::extract::ExtractorRegistry;
use crate::metadata;
use crate::sanitize::sanitize_text;
use chrono::{DateTime, Utc};
use dossier_common::domain::{Document, DocumentMetadata, DocumentPatch, Entity};
use dossier_common::errors::{AppError, Result};
use dossier_common::metrics;
use dossier_common::DocumentStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Output of a successful run, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub entities: Vec<Entity>,
}

/// Shared, cloneable processing pipeline.
#[derive(Clone)]
pub struct DocumentPipeline {
    store: Arc<dyn DocumentStore>,
    extractors: Arc<ExtractorRegistry>,
    entities: Arc<EntityExtractor>,
}

impl DocumentPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractors: ExtractorRegistry,
    ) -> std::result::Result<Self, IngestionError> {
        Ok(Self {
            store,
            extractors: Arc::new(extractors),
            entities: Arc::new(EntityExtractor::new()?),
        })
    }

    /// Pipeline with the default extractors.
    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> std::result::Result<Self, IngestionError> {
        Self::new(store, ExtractorRegistry::with_defaults())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Claim and process one document.
    ///
    /// `payload` is the raw upload when still in memory; otherwise the
    /// stored upload bytes are processed, falling back to the stored content
    /// for documents saved without them. Returns `Ok(None)` when another worker
    /// holds the claim. A pipeline failure is persisted as `failed` and
    /// returned as `AppError::Processing`.
    #[instrument(skip(self, id, payload), fields(document_id = %id))]
    pub async fn run(&self, id: Uuid, payload: Option<Arc<[u8]>>) -> Result<Option<Document>> {
        let doc = match self.store.update(id, DocumentPatch::claim()).await {
            Ok(doc) => doc,
            Err(AppError::StatusConflict { actual, .. }) => {
                debug!(status = %actual, "Document not pending, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.execute(doc, payload).await.map(Some)
    }

    /// Best-effort `processing -> failed`, used when a job dies before it
    /// could record its own outcome.
    pub async fn mark_failed(&self, id: Uuid, message: &str) {
        if let Err(e) = self.store.update(id, DocumentPatch::fail(message)).await {
            warn!(document_id = %id, error = %e, "Could not record processing failure");
        }
    }

    async fn execute(&self, doc: Document, payload: Option<Arc<[u8]>>) -> Result<Document> {
        let started = Instant::now();
        let id = doc.id;
        let format = doc.format().unwrap_or_default();

        let extractors = self.extractors.clone();
        let entities = self.entities.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let raw: &[u8] = match &payload {
                Some(bytes) => &bytes[..],
                None if !doc.raw.is_empty() => &doc.raw[..],
                None => doc.content.as_bytes(),
            };
            transform(&extractors, &entities, &doc, raw, Utc::now())
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))
        .and_then(|result| result);

        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(processed) => {
                let entity_count = processed.entities.len();
                let patch = DocumentPatch::complete(
                    processed.content,
                    processed.metadata,
                    processed.entities,
                    Utc::now(),
                );

                match self.store.update(id, patch).await {
                    Ok(saved) => {
                        metrics::record_processing(elapsed, &format, true, entity_count);
                        info!(entities = entity_count, elapsed_secs = elapsed, "Document processed");
                        Ok(saved)
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to store processing result");
                        self.mark_failed(id, &format!("failed to store result: {}", e)).await;
                        metrics::record_processing(elapsed, &format, false, 0);
                        Err(e)
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "Document processing failed");
                self.store.update(id, DocumentPatch::fail(&message)).await?;
                metrics::record_processing(elapsed, &format, false, 0);
                Err(AppError::Processing { message })
            }
        }
    }
}

/// The pure part of the pipeline: raw bytes in, storable output out.
pub fn transform(
    extractors: &ExtractorRegistry,
    entities: &EntityExtractor,
    doc: &Document,
    raw: &[u8],
    now: DateTime<Utc>,
) -> std::result::Result<ProcessedContent, IngestionError> {
    let format = doc
        .format()
        .ok_or_else(|| IngestionError::UnsupportedFormat(doc.name.clone()))?;

    let content = sanitize_text(&extractors.extract(&format, raw)?);
    let found = entities.extract(&content);
    let derived = metadata::derive(&content, &doc.name, now);

    Ok(ProcessedContent {
        metadata: metadata::merge(&doc.metadata, &derived),
        entities: found,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_common::db::MemoryDocumentStore;
    use dossier_common::domain::{EntityKind, ProcessingStatus};

    async fn stored(store: &Arc<dyn DocumentStore>, name: &str, content: &str) -> Document {
        let mut doc = Document::new(name, "text/plain", content.len().max(1) as u64, Uuid::new_v4());
        doc.content = content.to_string();
        store.create(doc).await.unwrap()
    }

    fn pipeline() -> (Arc<dyn DocumentStore>, DocumentPipeline) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let pipeline = DocumentPipeline::with_defaults(store.clone()).unwrap();
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_run_completes_document() {
        let (store, pipeline) = pipeline();
        let doc = stored(&store, "memo.txt", "Contact: a@b.gov, $2,500,000").await;

        let done = pipeline.run(doc.id, None).await.unwrap().unwrap();
        assert_eq!(done.processing_status, ProcessingStatus::Completed);
        assert!(done.processing_timestamp.is_some());
        assert!(done.processing_error.is_none());

        let kinds: Vec<EntityKind> = done.extracted_entities.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntityKind::Email, EntityKind::Money]);
    }

    #[tokio::test]
    async fn test_payload_takes_precedence_over_stored_content() {
        let (store, pipeline) = pipeline();
        let doc = stored(&store, "memo.txt", "stale").await;

        let payload: Arc<[u8]> = Arc::from(&b"Security   review"[..]);
        let done = pipeline.run(doc.id, Some(payload)).await.unwrap().unwrap();
        assert_eq!(done.content, "Security review");
        assert!(done.metadata.tags.contains("security"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_persisted() {
        let (store, pipeline) = pipeline();
        let doc = stored(&store, "scan.pdf", "").await;

        let payload: Arc<[u8]> = Arc::from(&b"%PDF-1.4 garbage"[..]);
        let err = pipeline.run(doc.id, Some(payload)).await.unwrap_err();
        assert!(matches!(err, AppError::Processing { .. }));

        let failed = store.get_by_id(doc.id).await.unwrap();
        assert_eq!(failed.processing_status, ProcessingStatus::Failed);
        assert!(failed.processing_error.unwrap().contains("PDF parse error"));
        assert!(failed.processing_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_second_claim_is_skipped() {
        let (store, pipeline) = pipeline();
        let doc = stored(&store, "memo.txt", "hello").await;

        assert!(pipeline.run(doc.id, None).await.unwrap().is_some());
        assert!(pipeline.run(doc.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_document_is_an_error() {
        let (_, pipeline) = pipeline();
        let err = pipeline.run(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }

    #[test]
    fn test_transform_keeps_caller_metadata() {
        let mut doc = Document::new("policy.txt", "text/plain", 10, Uuid::new_v4());
        doc.metadata.title = Some("Given".into());

        let processed = transform(
            &ExtractorRegistry::with_defaults(),
            &EntityExtractor::new().unwrap(),
            &doc,
            b"hello team",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(processed.content, "hello team");
        assert_eq!(processed.metadata.title.as_deref(), Some("Given"));
        assert_eq!(processed.metadata.category, None);
        assert!(processed.entities.is_empty());
    }
}
