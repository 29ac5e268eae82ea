//! Backlog sweeps
//!
//! Picks up `pending` documents whose in-process job never ran: the queue
//! was full, or the gateway that accepted the upload stopped first.

use crate::pipeline::DocumentPipeline;
use chrono::Utc;
use dossier_common::config::IngestionConfig;
use dossier_common::domain::ProcessingStatus;
use dossier_common::errors::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub failed: usize,
    /// Claimed by someone else between listing and claiming.
    pub skipped: usize,
}

pub struct BacklogWorker {
    pipeline: DocumentPipeline,
    batch_size: i64,
    poll_interval: Duration,
    grace_period: Duration,
}

impl BacklogWorker {
    pub fn new(
        pipeline: DocumentPipeline,
        batch_size: i64,
        poll_interval: Duration,
        grace_period: Duration,
    ) -> Self {
        Self {
            pipeline,
            batch_size,
            poll_interval,
            grace_period,
        }
    }

    pub fn from_config(pipeline: DocumentPipeline, config: &IngestionConfig) -> Self {
        Self::new(
            pipeline,
            config.backlog_batch_size,
            config.backlog_poll_interval(),
            config.backlog_grace_period(),
        )
    }

    /// Process one batch of pending documents older than the grace period.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let grace = chrono::Duration::from_std(self.grace_period).map_err(|e| {
            AppError::Configuration {
                message: format!("invalid backlog grace period: {}", e),
            }
        })?;
        let cutoff = Utc::now() - grace;

        let pending = self
            .pipeline
            .store()
            .get_by_status(ProcessingStatus::Pending, Some(self.batch_size))
            .await?;

        let mut report = SweepReport::default();
        // Oldest first, so everything after the first young document is young too.
        for doc in pending.iter().take_while(|doc| doc.uploaded_at <= cutoff) {
            match self.pipeline.run(doc.id, None).await {
                Ok(Some(_)) => report.completed += 1,
                Ok(None) => report.skipped += 1,
                Err(AppError::Processing { .. }) => report.failed += 1,
                Err(e) if e.is_storage_error() => return Err(e),
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "Backlog document not processed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweep every poll interval until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "Backlog worker started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => match self.sweep().await {
                    Ok(report) if report == SweepReport::default() => debug!("Backlog empty"),
                    Ok(report) => info!(
                        completed = report.completed,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Backlog sweep finished"
                    ),
                    Err(e) => error!(error = %e, "Backlog sweep failed"),
                },
            }
        }

        info!("Backlog worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::one_page_pdf;
    use crate::sanitize::sanitize;
    use dossier_common::db::MemoryDocumentStore;
    use dossier_common::domain::{Document, DocumentPatch};
    use dossier_common::DocumentStore;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn pending(store: &Arc<dyn DocumentStore>, name: &str, text: &str, age_secs: i64) -> Uuid {
        let mut doc = Document::new(name, "text/plain", text.len() as u64, Uuid::new_v4());
        doc.content = text.to_string();
        doc.uploaded_at = Utc::now() - chrono::Duration::seconds(age_secs);
        store.create(doc).await.unwrap().id
    }

    fn worker(store: Arc<dyn DocumentStore>) -> BacklogWorker {
        BacklogWorker::new(
            DocumentPipeline::with_defaults(store).unwrap(),
            10,
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_sweep_processes_old_documents_only() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let old = pending(&store, "old.txt", "old budget", 600).await;
        let fresh = pending(&store, "fresh.txt", "fresh budget", 0).await;

        let report = worker(store.clone()).sweep().await.unwrap();
        assert_eq!(report, SweepReport { completed: 1, failed: 0, skipped: 0 });

        assert_eq!(
            store.get_by_id(old).await.unwrap().processing_status,
            ProcessingStatus::Completed
        );
        assert_eq!(
            store.get_by_id(fresh).await.unwrap().processing_status,
            ProcessingStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_sweep_counts_failures() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        pending(&store, "broken.pdf", "%PDF-1.4 nothing here", 600).await;

        let report = worker(store.clone()).sweep().await.unwrap();
        assert_eq!(report.failed, 1);

        let failed = store.get_by_status(ProcessingStatus::Failed, None).await.unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_parses_stored_pdf_upload() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let pdf = one_page_pdf("Budget review memo");
        let mut doc = Document::new("memo.pdf", "application/pdf", pdf.len() as u64, Uuid::new_v4());
        doc.content = sanitize(&pdf);
        doc.raw = pdf;
        doc.uploaded_at = Utc::now() - chrono::Duration::seconds(600);
        let id = store.create(doc).await.unwrap().id;

        let report = worker(store.clone()).sweep().await.unwrap();
        assert_eq!(report, SweepReport { completed: 1, failed: 0, skipped: 0 });

        let done = store.get_by_id(id).await.unwrap();
        assert_eq!(done.processing_status, ProcessingStatus::Completed);
        assert_eq!(done.content, "Budget review memo");
        assert_eq!(done.metadata.title.as_deref(), Some("Budget review memo"));
    }

    #[tokio::test]
    async fn test_failed_documents_are_not_retried() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let id = pending(&store, "memo.txt", "memo", 600).await;
        store.update(id, DocumentPatch::claim()).await.unwrap();
        store.update(id, DocumentPatch::fail("boom")).await.unwrap();

        let report = worker(store.clone()).sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let id = pending(&store, "memo.txt", "memo", 600).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(worker(store.clone()).run(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(
            store.get_by_id(id).await.unwrap().processing_status,
            ProcessingStatus::Completed
        );
    }
}
