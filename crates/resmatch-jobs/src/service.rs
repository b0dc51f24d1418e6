//! Entry point used by the HTTP layer: submit, inspect, stream, cancel, and
//! collect matching jobs.

use std::sync::Arc;

use tracing::info;

use resmatch_core::{
    defaults, ArtifactRef, ArtifactStore, Error, Job, JobId, JobInput, JobResult, JobStats,
    Result,
};

use crate::broadcast::Subscription;
use crate::queue::{JobQueue, QueuedJob};
use crate::store::JobStore;

/// Facade over the store, queue, and broadcaster.
#[derive(Clone)]
pub struct JobService {
    store: Arc<JobStore>,
    queue: JobQueue,
    artifacts: Arc<dyn ArtifactStore>,
    max_batch_size: usize,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, queue: JobQueue, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            queue,
            artifacts,
            max_batch_size: defaults::MAX_BATCH_SIZE,
        }
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.max(1);
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Queue a single-resume job. Returns as soon as the job is enqueued.
    pub async fn submit_single(&self, resume: ArtifactRef, job_description: &str) -> Result<JobId> {
        self.submit(JobInput::single(resume, job_description)).await
    }

    /// Queue a batch job ranking several resumes.
    pub async fn submit_batch(
        &self,
        resumes: Vec<ArtifactRef>,
        job_description: &str,
    ) -> Result<JobId> {
        self.submit(JobInput::batch(resumes, job_description)).await
    }

    async fn submit(&self, input: JobInput) -> Result<JobId> {
        self.validate(&input).await?;

        let job = self.store.create(&input);
        let queued = QueuedJob {
            id: job.id,
            input: Arc::new(input),
        };
        if let Err(e) = self.queue.enqueue(queued) {
            self.store.discard(job.id);
            return Err(e);
        }

        info!(
            job_id = %job.id,
            kind = %job.kind,
            resumes = job.resume_count,
            queue_depth = self.queue.depth(),
            "Job submitted"
        );
        Ok(job.id)
    }

    async fn validate(&self, input: &JobInput) -> Result<()> {
        if input.job_description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "No job description provided".to_string(),
            ));
        }
        if input.resumes.is_empty() {
            return Err(Error::InvalidInput("No resume provided".to_string()));
        }
        if input.resumes.len() > self.max_batch_size {
            return Err(Error::InvalidInput(format!(
                "Too many resumes: {} (maximum {})",
                input.resumes.len(),
                self.max_batch_size
            )));
        }
        for artifact in &input.resumes {
            if !self.artifacts.exists(artifact).await? {
                return Err(Error::InvalidInput(format!(
                    "Resume '{}' is not available",
                    artifact.file_name
                )));
            }
        }
        Ok(())
    }

    pub fn get_status(&self, id: JobId) -> Result<Job> {
        self.store.get(id).ok_or(Error::JobNotFound(id))
    }

    pub fn subscribe(&self, id: JobId) -> Result<Subscription> {
        self.store
            .broadcaster()
            .subscribe(id)
            .ok_or(Error::JobNotFound(id))
    }

    pub fn cancel(&self, id: JobId) -> Result<Job> {
        self.store.cancel(id)
    }

    /// Result of a completed job; the job stays available until swept.
    pub fn get_result(&self, id: JobId) -> Result<JobResult> {
        self.store.result(id)
    }

    /// Result of a completed job, removing the job.
    pub fn consume_result(&self, id: JobId) -> Result<JobResult> {
        self.store.take_result(id)
    }

    pub fn stats(&self) -> JobStats {
        self.store.stats()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }
}
