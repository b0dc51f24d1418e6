//! Worker pool draining the job queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use resmatch_core::{defaults, ArtifactStore, Error, JobId, JobKind, MatchingEngine, Result};

use crate::pipeline::{self, JobContext, PipelineDeps, PipelineError};
use crate::queue::{QueueReceiver, QueuedJob};
use crate::store::JobStore;

/// Capacity of the worker event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Upper bound on one job's pipeline run, in seconds.
    pub job_timeout_secs: u64,
    /// Whether to start workers at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `WORKER_COUNT` | `2` | Number of workers |
    /// | `JOB_TIMEOUT_SECS` | `300` | Per-job timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let worker_count = std::env::var("WORKER_COUNT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::WORKER_COUNT)
            .max(1);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            worker_count,
            job_timeout_secs,
            enabled,
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A worker picked up a job.
    JobStarted { job_id: JobId, worker: usize },
    /// A job completed successfully.
    JobCompleted { job_id: JobId, kind: JobKind },
    /// A job failed.
    JobFailed { job_id: JobId, error: String },
    /// A job stopped because it was cancelled.
    JobCancelled { job_id: JobId },
    /// A worker started.
    WorkerStarted { worker: usize },
    /// A worker stopped.
    WorkerStopped { worker: usize },
}

/// Handle for controlling a running pool.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    /// Held while workers are disabled so the queue stays open for submissions.
    parked: Option<QueueReceiver>,
}

impl WorkerHandle {
    /// Ask workers to stop after their current job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every worker to exit.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            task.await
                .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))?;
        }
        Ok(())
    }

    /// Receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Number of running worker tasks.
    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is held open without workers draining it.
    pub fn is_parked(&self) -> bool {
        self.parked.is_some()
    }
}

/// Fixed-size pool of workers sharing one queue.
pub struct WorkerPool {
    store: Arc<JobStore>,
    receiver: QueueReceiver,
    deps: PipelineDeps,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl WorkerPool {
    /// Spawn the workers and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let event_tx = self.event_tx.clone();

        if !self.config.enabled {
            info!("Job workers are disabled, jobs will stay queued");
            return WorkerHandle {
                shutdown,
                tasks: Vec::new(),
                event_tx,
                parked: Some(self.receiver),
            };
        }

        info!(
            workers = self.config.worker_count,
            job_timeout_secs = self.config.job_timeout_secs,
            "Starting job workers"
        );

        let pool = Arc::new(self);
        let tasks = (0..pool.config.worker_count)
            .map(|worker| {
                let pool = pool.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run(worker, shutdown).await })
            })
            .collect();

        WorkerHandle {
            shutdown,
            tasks,
            event_tx,
            parked: None,
        }
    }

    #[instrument(skip(self, shutdown))]
    async fn run(&self, worker: usize, shutdown: CancellationToken) {
        debug!("Worker started");
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted { worker });

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = self.receiver.recv() => job,
            };
            match next {
                Some(job) => self.process(worker, job).await,
                None => break,
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped { worker });
        debug!("Worker stopped");
    }

    /// Run one job to a terminal state. Artifacts are released on every
    /// path before the outcome is recorded.
    async fn process(&self, worker: usize, queued: QueuedJob) {
        let start = Instant::now();
        let job_id = queued.id;

        if let Err(e) = self.store.mark_processing(job_id) {
            debug!(%job_id, error = %e, "Skipping job that is no longer queued");
            self.release(&queued).await;
            if matches!(e, Error::AlreadyTerminal { .. }) {
                let _ = self.event_tx.send(WorkerEvent::JobCancelled { job_id });
            }
            return;
        }

        info!(%job_id, worker, kind = %queued.input.kind, resumes = queued.input.resumes.len(), "Processing job");
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, worker });

        let cancel = self
            .store
            .cancellation_token(job_id)
            .unwrap_or_default();
        let ctx = JobContext::new(job_id, self.store.clone(), cancel);
        let task = tokio::spawn(pipeline::run(
            ctx,
            queued.input.clone(),
            self.deps.clone(),
        ));
        let abort = task.abort_handle();

        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        let outcome = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                error!(%job_id, error = %join_err, "Job task panicked");
                Err(PipelineError::Failed(
                    "Internal error while processing job".to_string(),
                ))
            }
            Err(_) => {
                abort.abort();
                warn!(%job_id, timeout_secs = self.config.job_timeout_secs, "Job exceeded timeout");
                Err(PipelineError::Failed(format!(
                    "Job exceeded timeout of {}s",
                    self.config.job_timeout_secs
                )))
            }
        };

        // Inputs are no longer needed once the pipeline has stopped.
        self.release(&queued).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => match self.store.complete(job_id, result) {
                Ok(job) => {
                    info!(%job_id, duration_ms, "Job completed successfully");
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                        job_id,
                        kind: job.kind,
                    });
                }
                Err(e) => self.lost_race(job_id, e),
            },
            Err(PipelineError::Cancelled) => {
                info!(%job_id, duration_ms, "Job stopped after cancellation");
                let _ = self.event_tx.send(WorkerEvent::JobCancelled { job_id });
            }
            Err(PipelineError::Failed(message)) => match self.store.fail(job_id, &message) {
                Ok(_) => {
                    warn!(%job_id, error = %message, duration_ms, "Job failed");
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        error: message,
                    });
                }
                Err(e) => self.lost_race(job_id, e),
            },
        }
    }

    /// A terminal write was refused because cancellation landed first.
    fn lost_race(&self, job_id: JobId, err: Error) {
        match err {
            Error::AlreadyTerminal { status, .. } => {
                info!(%job_id, %status, "Job reached a terminal state before the worker finished");
                let _ = self.event_tx.send(WorkerEvent::JobCancelled { job_id });
            }
            other => error!(%job_id, error = %other, "Failed to record job outcome"),
        }
    }

    async fn release(&self, queued: &QueuedJob) {
        for artifact in &queued.input.resumes {
            if let Err(e) = self.deps.artifacts.release(artifact).await {
                warn!(job_id = %queued.id, file = %artifact.file_name, error = %e, "Failed to release artifact");
            }
        }
    }
}

/// Builder for a worker pool.
pub struct WorkerBuilder {
    store: Arc<JobStore>,
    receiver: QueueReceiver,
    engine: Arc<dyn MatchingEngine>,
    artifacts: Arc<dyn ArtifactStore>,
    config: WorkerConfig,
}

impl WorkerBuilder {
    pub fn new(
        store: Arc<JobStore>,
        receiver: QueueReceiver,
        engine: Arc<dyn MatchingEngine>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            store,
            receiver,
            engine,
            artifacts,
            config: WorkerConfig::default(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> WorkerPool {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        WorkerPool {
            store: self.store,
            receiver: self.receiver,
            deps: PipelineDeps {
                engine: self.engine,
                artifacts: self.artifacts,
            },
            config: self.config,
            event_tx,
        }
    }
}
