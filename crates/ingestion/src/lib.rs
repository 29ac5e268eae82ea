//! Dossier ingestion
//!
//! Upload validation, content sanitization, text extraction, entity and
//! metadata derivation, and the bounded background processing that ties
//! them together.

pub mod backlog;
pub mod entities;
pub mod errors;
pub mod extract;
pub mod metadata;
pub mod pipeline;
pub mod sanitize;
pub mod service;
pub mod validator;
pub mod worker;

pub use backlog::BacklogWorker;
pub use errors::IngestionError;
pub use pipeline::DocumentPipeline;
pub use service::{FileUpload, IngestStatus, IngestionService, ProcessingResult};
pub use validator::{UploadValidator, ValidationResult};
pub use worker::{job_queue, JobQueue, WorkerPool};
