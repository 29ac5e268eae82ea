//! Bounded background processing
//!
//! A fixed-capacity job queue drained by a fixed number of workers. Jobs
//! that cannot be queued are not lost: their documents stay `pending` and
//! the backlog worker picks them up.

use crate::pipeline::DocumentPipeline;
use dossier_common::metrics;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Payload memory is accounted in KiB so large budgets fit semaphore permits.
const PERMIT_UNIT: u64 = 1024;

/// One document waiting for a worker.
pub struct ProcessingJob {
    pub document_id: Uuid,
    pub payload: Option<Arc<[u8]>>,
    permit: Option<OwnedSemaphorePermit>,
}

/// Why a job was left to the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    QueueFull,
    QueueClosed,
    PayloadBudget,
}

impl DeferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferReason::QueueFull => "queue_full",
            DeferReason::QueueClosed => "queue_closed",
            DeferReason::PayloadBudget => "payload_budget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    Deferred(DeferReason),
}

/// Sending half of the job queue. Workers stop once every clone is dropped.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<ProcessingJob>,
    payload_budget: Arc<Semaphore>,
}

/// Receiving half, handed to [`WorkerPool::spawn`].
pub struct JobReceiver(mpsc::Receiver<ProcessingJob>);

/// Create a queue holding at most `capacity` jobs and `max_inflight_bytes`
/// of upload payloads.
pub fn job_queue(capacity: usize, max_inflight_bytes: u64) -> (JobQueue, JobReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let permits = usize::try_from(max_inflight_bytes / PERMIT_UNIT)
        .unwrap_or(Semaphore::MAX_PERMITS)
        .min(Semaphore::MAX_PERMITS);

    let queue = JobQueue {
        sender,
        payload_budget: Arc::new(Semaphore::new(permits)),
    };
    (queue, JobReceiver(receiver))
}

impl JobQueue {
    /// Queue a document without waiting.
    pub fn submit(&self, document_id: Uuid, payload: Option<Vec<u8>>) -> Submission {
        let (payload, permit) = match payload {
            Some(bytes) => {
                let units = u32::try_from((bytes.len() as u64).div_ceil(PERMIT_UNIT).max(1))
                    .unwrap_or(u32::MAX);
                match self.payload_budget.clone().try_acquire_many_owned(units) {
                    Ok(permit) => (Some(Arc::from(bytes)), Some(permit)),
                    Err(_) => return self.defer(document_id, DeferReason::PayloadBudget),
                }
            }
            None => (None, None),
        };

        let job = ProcessingJob {
            document_id,
            payload,
            permit,
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                metrics::set_queue_depth(self.depth());
                debug!(document_id = %document_id, "Processing job queued");
                Submission::Queued
            }
            Err(TrySendError::Full(_)) => self.defer(document_id, DeferReason::QueueFull),
            Err(TrySendError::Closed(_)) => self.defer(document_id, DeferReason::QueueClosed),
        }
    }

    /// Jobs waiting for a worker.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn defer(&self, document_id: Uuid, reason: DeferReason) -> Submission {
        warn!(
            document_id = %document_id,
            reason = reason.as_str(),
            "Processing job deferred to backlog"
        );
        metrics::record_queue_deferred(reason.as_str());
        Submission::Deferred(reason)
    }
}

/// Fixed set of workers sharing one receiver.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(pipeline: DocumentPipeline, receiver: JobReceiver, workers: usize) -> Self {
        let receiver = Arc::new(Mutex::new(receiver.0));
        let handles = (0..workers.max(1))
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, pipeline.clone(), receiver.clone())))
            .collect();

        info!(workers = workers.max(1), "Processing workers started");
        Self { handles }
    }

    /// Wait for the workers to drain the queue. Returns once every
    /// [`JobQueue`] clone has been dropped and the backlog of queued jobs is
    /// processed.
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Processing worker exited abnormally");
            }
        }
        info!("Processing workers stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    pipeline: DocumentPipeline,
    receiver: Arc<Mutex<mpsc::Receiver<ProcessingJob>>>,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            let job = rx.recv().await;
            metrics::set_queue_depth(rx.len());
            job
        };
        let Some(ProcessingJob {
            document_id,
            payload,
            permit,
        }) = job
        else {
            break;
        };

        // A panicking job must not take the worker down with it.
        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(document_id, payload).await })
        };

        match task.await {
            Ok(Ok(Some(_))) => debug!(worker_id, document_id = %document_id, "Job finished"),
            Ok(Ok(None)) => debug!(worker_id, document_id = %document_id, "Job skipped"),
            Ok(Err(e)) => {
                warn!(worker_id, document_id = %document_id, error = %e, "Job failed")
            }
            Err(e) => {
                error!(worker_id, document_id = %document_id, error = %e, "Job panicked");
                pipeline
                    .mark_failed(document_id, &format!("processing task aborted: {}", e))
                    .await;
            }
        }

        drop(permit);
    }

    debug!(worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_common::db::MemoryDocumentStore;
    use dossier_common::domain::{Document, ProcessingStatus};
    use dossier_common::DocumentStore;

    async fn pending_doc(store: &Arc<dyn DocumentStore>, text: &str) -> Uuid {
        let mut doc = Document::new("note.txt", "text/plain", text.len() as u64, Uuid::new_v4());
        doc.content = text.to_string();
        store.create(doc).await.unwrap().id
    }

    #[tokio::test]
    async fn test_full_queue_defers() {
        let (queue, _receiver) = job_queue(1, 1024 * 1024);
        assert_eq!(queue.submit(Uuid::new_v4(), None), Submission::Queued);
        assert_eq!(
            queue.submit(Uuid::new_v4(), None),
            Submission::Deferred(DeferReason::QueueFull)
        );
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_defers() {
        let (queue, receiver) = job_queue(4, 1024 * 1024);
        drop(receiver);
        assert_eq!(
            queue.submit(Uuid::new_v4(), None),
            Submission::Deferred(DeferReason::QueueClosed)
        );
    }

    #[tokio::test]
    async fn test_payload_budget_defers() {
        let (queue, _receiver) = job_queue(4, 2048);
        assert_eq!(queue.submit(Uuid::new_v4(), Some(vec![b'a'; 2048])), Submission::Queued);
        assert_eq!(
            queue.submit(Uuid::new_v4(), Some(vec![b'b'; 10])),
            Submission::Deferred(DeferReason::PayloadBudget)
        );
    }

    #[tokio::test]
    async fn test_pool_drains_queue_on_shutdown() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let pipeline = DocumentPipeline::with_defaults(store.clone()).unwrap();
        let (queue, receiver) = job_queue(8, 1024 * 1024);

        let first = pending_doc(&store, "first report").await;
        let second = pending_doc(&store, "second report").await;
        queue.submit(first, None);
        queue.submit(second, Some(b"second   report".to_vec()));

        let pool = WorkerPool::spawn(pipeline, receiver, 2);
        drop(queue);
        pool.join().await;

        for id in [first, second] {
            let doc = store.get_by_id(id).await.unwrap();
            assert_eq!(doc.processing_status, ProcessingStatus::Completed);
        }
        assert_eq!(store.get_by_id(second).await.unwrap().content, "second report");
    }
}
