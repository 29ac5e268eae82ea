//! Ingestion orchestration
//!
//! `ingest` validates and stores an upload, then hands it to the worker
//! pool without waiting. `process_document` runs the pipeline inline for
//! explicit (re)processing.

use crate::pipeline::DocumentPipeline;
use crate::sanitize::{sanitize, sanitize_metadata, sanitize_text};
use crate::validator::UploadValidator;
use crate::worker::{JobQueue, Submission};
use dossier_common::domain::{
    ClassificationLevel, Document, DocumentMetadata, DocumentPatch, ProcessingStatus,
};
use dossier_common::errors::{AppError, Result};
use dossier_common::metrics;
use dossier_common::DocumentStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Content type used when neither the client nor the extension gives one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An upload as received from the transport.
pub struct FileUpload<R> {
    pub name: String,
    /// Client-supplied content type, if any.
    pub content_type: Option<String>,
    /// Size the client announced; must match the bytes actually read.
    pub declared_size: u64,
    pub body: R,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Uploaded,
    Failed,
}

/// Outcome of an ingest call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    #[serde(rename = "documentID", skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    pub status: IngestStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ProcessingResult {
    pub fn uploaded(document_id: Uuid) -> Self {
        Self {
            document_id: Some(document_id),
            status: IngestStatus::Uploaded,
            message: "Document uploaded successfully and queued for processing".to_string(),
            errors: Vec::new(),
        }
    }

    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            document_id: None,
            status: IngestStatus::Failed,
            message: "Document validation failed".to_string(),
            errors,
        }
    }
}

#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn DocumentStore>,
    pipeline: DocumentPipeline,
    validator: UploadValidator,
    queue: JobQueue,
}

impl IngestionService {
    pub fn new(pipeline: DocumentPipeline, validator: UploadValidator, queue: JobQueue) -> Self {
        Self {
            store: pipeline.store().clone(),
            pipeline,
            validator,
            queue,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    /// Validate, persist as `pending` and queue for processing.
    ///
    /// Rejected uploads come back as a `failed` result with nothing stored;
    /// only storage failures are returned as errors.
    #[instrument(skip(self, upload, metadata), fields(file_name = %upload.name, declared_size = upload.declared_size))]
    pub async fn ingest<R>(
        &self,
        upload: FileUpload<R>,
        metadata: DocumentMetadata,
        classification: ClassificationLevel,
        uploaded_by: Uuid,
    ) -> Result<ProcessingResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let name = sanitize_text(upload.name.trim());
        let validation = self.validator.validate(&name, upload.declared_size);
        let format = validation.format.clone().unwrap_or_default();
        if !validation.valid {
            info!(errors = ?validation.errors, "Upload rejected");
            metrics::record_upload(false, &format, 0);
            return Ok(ProcessingResult::rejected(validation.errors));
        }

        let bytes = match read_bounded(upload.body, self.validator.max_size()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to read upload body");
                metrics::record_upload(false, &format, 0);
                return Ok(ProcessingResult::rejected(vec![format!(
                    "failed to read upload: {}",
                    e
                )]));
            }
        };

        if bytes.len() as u64 != upload.declared_size {
            metrics::record_upload(false, &format, 0);
            return Ok(ProcessingResult::rejected(vec![format!(
                "declared size of {} bytes does not match {} bytes received",
                upload.declared_size,
                bytes.len()
            )]));
        }

        let content_type = upload
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&name)
                    .first_raw()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string()
            });

        let mut doc = Document::new(name, content_type, bytes.len() as u64, uploaded_by);
        doc.checksum = hex::encode(Sha256::digest(&bytes));
        doc.content = sanitize(&bytes);
        doc.raw = bytes;
        doc.classification = classification;
        doc.metadata = sanitize_metadata(metadata);

        let mut doc = self.store.create(doc).await?;
        let size = doc.size;
        let payload = std::mem::take(&mut doc.raw);

        match self.queue.submit(doc.id, Some(payload)) {
            Submission::Queued => {}
            Submission::Deferred(reason) => {
                info!(document_id = %doc.id, reason = reason.as_str(), "Document left pending for backlog");
            }
        }

        metrics::record_upload(true, &format, size);
        info!(document_id = %doc.id, size, "Document uploaded");

        Ok(ProcessingResult::uploaded(doc.id))
    }

    /// Process a document now and return its terminal state.
    ///
    /// `completed` documents are returned untouched; `failed` ones are
    /// reset and retried; one already `processing` is a conflict.
    #[instrument(skip(self))]
    pub async fn process_document(&self, id: Uuid) -> Result<Document> {
        let doc = self.store.get_by_id(id).await?;

        match doc.processing_status {
            ProcessingStatus::Completed => return Ok(doc),
            ProcessingStatus::Processing => {
                return Err(AppError::Conflict {
                    message: format!("document {} is already being processed", id),
                })
            }
            ProcessingStatus::Failed => {
                self.store.update(id, DocumentPatch::reset_failed()).await?;
                info!("Failed document reset for reprocessing");
            }
            ProcessingStatus::Pending => {}
        }

        self.pipeline.run(id, None).await?.ok_or_else(|| AppError::Conflict {
            message: format!("document {} was claimed by another worker", id),
        })
    }

    /// Current state of a document. Never triggers processing.
    pub async fn get_status(&self, id: Uuid) -> Result<Document> {
        self.store.get_by_id(id).await
    }
}

/// Read at most `max + 1` bytes so oversized bodies are detected without
/// buffering them whole.
async fn read_bounded<R>(body: R, max: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    body.take(max.saturating_add(1)).read_to_end(&mut bytes).await?;
    Ok(bytes)
}
