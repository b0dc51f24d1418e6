//! FIFO hand-off between request handlers and the worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use resmatch_core::{Error, JobId, JobInput, Result};

/// A job waiting for a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: JobId,
    pub input: Arc<JobInput>,
}

/// Create a connected queue sender and receiver.
pub fn job_queue() -> (JobQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        JobQueue {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
            depth,
        },
    )
}

/// Producer side. Cheap to clone; `enqueue` never blocks.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let id = job.id;
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Internal(
                "Job queue is closed; worker pool has shut down".to_string(),
            ));
        }
        trace!(job_id = %id, "Job enqueued");
        Ok(())
    }

    /// Jobs enqueued but not yet taken by a worker.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer side, shared by all workers.
///
/// The async mutex lets exactly one idle worker wait on the channel at a
/// time, which keeps dequeue order FIFO across workers.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    depth: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Wait for the next job. `None` once every sender is gone and the queue is drained.
    pub async fn recv(&self) -> Option<QueuedJob> {
        let job = self.rx.lock().await.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
