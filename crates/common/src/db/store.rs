//! Storage abstraction for documents

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Document, DocumentPatch, DocumentStatistics, ProcessingStatus, SearchFilter, SearchPage};
use crate::errors::Result;

/// Persistence, indexing and search for documents.
///
/// Implementations must make guarded status changes atomic: of two
/// concurrent `update`s expecting the same status, exactly one succeeds and
/// the other fails with `AppError::StatusConflict`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document. A nil id is replaced with a fresh one.
    async fn create(&self, doc: Document) -> Result<Document>;

    /// Fetch by id; `AppError::DocumentNotFound` if absent.
    async fn get_by_id(&self, id: Uuid) -> Result<Document>;

    /// Apply a partial change and return the stored result.
    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document>;

    /// Remove permanently; `AppError::DocumentNotFound` if absent.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Filtered, ranked, paginated search.
    async fn search(&self, filter: &SearchFilter) -> Result<SearchPage>;

    /// Documents in `status`, oldest upload first. Limit defaults to 50.
    async fn get_by_status(&self, status: ProcessingStatus, limit: Option<i64>) -> Result<Vec<Document>>;

    /// Documents uploaded by `user`, newest first. Limit defaults to 20.
    async fn get_by_user(&self, user: Uuid, limit: Option<i64>, skip: u64) -> Result<SearchPage>;

    /// Live totals by status and category.
    async fn statistics(&self) -> Result<DocumentStatistics>;

    /// Create the text index and secondary indexes if missing.
    async fn ensure_indexes(&self) -> Result<()>;

    /// Connectivity check.
    async fn ping(&self) -> Result<()>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
