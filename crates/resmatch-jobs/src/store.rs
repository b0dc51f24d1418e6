//! Authoritative job state.
//!
//! One `RwLock` guards every entry. Reads clone the job out; writes run
//! through a forward-only transition guard and publish the resulting
//! snapshot to the [`ProgressBroadcaster`] before the lock is released, so
//! subscribers observe snapshots in write order. Lock order is always
//! store, then broadcaster.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use resmatch_core::{
    new_job_id, Error, Job, JobId, JobInput, JobResult, JobStats, JobStatus, ProgressSnapshot,
    Result, Stage,
};

use crate::broadcast::ProgressBroadcaster;

struct JobEntry {
    job: Job,
    result: Option<JobResult>,
    cancel: CancellationToken,
    /// Monotonic completion time, used for retention.
    finished_at: Option<Instant>,
}

/// In-memory store of jobs, results, and cancellation tokens.
pub struct JobStore {
    entries: RwLock<HashMap<JobId, JobEntry>>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl JobStore {
    pub fn new(broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new queued job and open its progress channel.
    pub fn create(&self, input: &JobInput) -> Job {
        let job = Job::new(new_job_id(), input);
        let mut entries = self.write();
        self.broadcaster.register(job.snapshot());
        entries.insert(
            job.id,
            JobEntry {
                job: job.clone(),
                result: None,
                cancel: CancellationToken::new(),
                finished_at: None,
            },
        );
        debug!(job_id = %job.id, kind = %job.kind, resumes = job.resume_count, "Job created");
        job
    }

    /// Drop a job that never reached a worker.
    pub(crate) fn discard(&self, id: JobId) {
        let mut entries = self.write();
        if entries.remove(&id).is_some() {
            self.broadcaster.close(id);
        }
    }

    /// Copy of the job's current state.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).map(|e| e.job.clone())
    }

    pub fn snapshot(&self, id: JobId) -> Option<ProgressSnapshot> {
        self.read().get(&id).map(|e| e.job.snapshot())
    }

    pub fn cancellation_token(&self, id: JobId) -> Option<CancellationToken> {
        self.read().get(&id).map(|e| e.cancel.clone())
    }

    /// Apply a status transition under the write lock and publish the result.
    fn transition<F>(&self, id: JobId, next: JobStatus, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut JobEntry),
    {
        let mut entries = self.write();
        let entry = entries.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        let current = entry.job.status;
        if !current.can_transition_to(next) {
            return Err(if current.is_terminal() {
                Error::AlreadyTerminal {
                    id,
                    status: current,
                }
            } else {
                Error::Internal(format!(
                    "Illegal transition for job {}: {} -> {}",
                    id, current, next
                ))
            });
        }
        entry.job.status = next;
        apply(entry);
        if next.is_terminal() {
            entry.job.completed_at = Some(Utc::now());
            entry.finished_at = Some(Instant::now());
        }
        self.broadcaster.publish(entry.job.snapshot());
        Ok(entry.job.clone())
    }

    /// `queued -> processing`. Fails if the job was cancelled while queued.
    pub fn mark_processing(&self, id: JobId) -> Result<Job> {
        if let Some(job) = self.get(id) {
            if job.status == JobStatus::Processing {
                return Err(Error::Internal(format!("Job {} is already processing", id)));
            }
        }
        self.transition(id, JobStatus::Processing, |entry| {
            entry.job.started_at = Some(Utc::now());
            entry.job.message = "Processing started".to_string();
        })
    }

    /// Record progress for a processing job.
    ///
    /// Progress never decreases and is capped at 100. Returns `None` when the
    /// job is unknown or not processing, which includes a job that was
    /// cancelled while its worker was mid-stage.
    pub fn update_progress(
        &self,
        id: JobId,
        percent: u8,
        stage: Stage,
        message: impl Into<String>,
    ) -> Option<ProgressSnapshot> {
        let mut entries = self.write();
        let entry = entries.get_mut(&id)?;
        if entry.job.status != JobStatus::Processing {
            return None;
        }
        entry.job.progress = entry.job.progress.max(percent.min(100));
        entry.job.stage = stage;
        entry.job.message = message.into();
        let snapshot = entry.job.snapshot();
        self.broadcaster.publish(snapshot.clone());
        Some(snapshot)
    }

    /// `processing -> completed`, storing the result.
    pub fn complete(&self, id: JobId, result: JobResult) -> Result<Job> {
        self.transition(id, JobStatus::Completed, move |entry| {
            entry.job.progress = 100;
            entry.job.message = "Processing complete!".to_string();
            entry.job.redirect_url = Some(entry.job.kind.redirect_url(id));
            entry.result = Some(result);
        })
    }

    /// `processing -> error`. Progress keeps its last value.
    pub fn fail(&self, id: JobId, message: impl Into<String>) -> Result<Job> {
        let message = message.into();
        self.transition(id, JobStatus::Error, move |entry| {
            entry.job.message = message;
        })
    }

    /// Cancel a queued or processing job and raise its cancellation signal.
    pub fn cancel(&self, id: JobId) -> Result<Job> {
        let job = self.transition(id, JobStatus::Cancelled, |entry| {
            entry.job.progress = 100;
            entry.job.stage = Stage::Cancelled;
            entry.job.message = "Job cancelled by user".to_string();
            entry.cancel.cancel();
        })?;
        info!(job_id = %id, "Job cancelled");
        Ok(job)
    }

    fn check_result(id: JobId, entry: &JobEntry) -> Result<()> {
        match entry.job.status {
            JobStatus::Queued | JobStatus::Processing => Err(Error::StillProcessing(id)),
            JobStatus::Completed if entry.result.is_some() => Ok(()),
            status => Err(Error::NoResult { id, status }),
        }
    }

    /// Copy of a completed job's result.
    pub fn result(&self, id: JobId) -> Result<JobResult> {
        let entries = self.read();
        let entry = entries.get(&id).ok_or(Error::JobNotFound(id))?;
        Self::check_result(id, entry)?;
        entry
            .result
            .clone()
            .ok_or(Error::NoResult {
                id,
                status: entry.job.status,
            })
    }

    /// Remove a completed job and hand over its result.
    pub fn take_result(&self, id: JobId) -> Result<JobResult> {
        let mut entries = self.write();
        let entry = entries.get(&id).ok_or(Error::JobNotFound(id))?;
        Self::check_result(id, entry)?;
        let entry = entries.remove(&id).ok_or(Error::JobNotFound(id))?;
        self.broadcaster.close(id);
        debug!(job_id = %id, "Result consumed");
        entry.result.ok_or(Error::NoResult {
            id,
            status: JobStatus::Completed,
        })
    }

    /// Remove terminal jobs that finished at least `retention` ago.
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let expired: Vec<JobId> = entries
            .iter()
            .filter(|(_, e)| {
                e.job.status.is_terminal()
                    && e
                        .finished_at
                        .map(|t| now.duration_since(t) >= retention)
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            entries.remove(id);
            self.broadcaster.close(*id);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), remaining = entries.len(), "Swept expired jobs");
        }
        expired.len()
    }

    pub fn stats(&self) -> JobStats {
        let entries = self.read();
        let mut stats = JobStats {
            total: entries.len(),
            ..JobStats::default()
        };
        for entry in entries.values() {
            match entry.job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Error => stats.error += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
