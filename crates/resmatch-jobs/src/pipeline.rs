//! The staged matching pipeline shared by single and batch jobs.
//!
//! | Stage | Progress | Notes |
//! |-------|----------|-------|
//! | extracting | 10 | load every artifact |
//! | analyzing | 30 | analyze the job description once |
//! | calculating | 40..85 | score each resume |
//! | ranking | 90 | batch only |
//! | finalizing | 95 | |
//!
//! Cancellation is cooperative: [`JobContext::checkpoint`] runs before each
//! stage and between batch items, and a progress write rejected by the store
//! is treated the same way.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use resmatch_core::{
    ArtifactStore, JobId, JobInput, JobKind, JobProfile, JobResult, MatchResult, MatchingEngine,
    ResumeDocument, Stage,
};

use crate::store::JobStore;

const CALCULATING_START: u8 = 40;
const CALCULATING_END: u8 = 85;

/// Why a pipeline run stopped early.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The job was cancelled or otherwise left `processing`.
    #[error("job cancelled")]
    Cancelled,
    /// Processing failed; the message becomes the job's error message.
    #[error("{0}")]
    Failed(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Per-job handle given to the pipeline for progress and cancellation.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    store: Arc<JobStore>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(job_id: JobId, store: Arc<JobStore>, cancel: CancellationToken) -> Self {
        Self {
            job_id,
            store,
            cancel,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop here if cancellation was requested.
    pub fn checkpoint(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            debug!(job_id = %self.job_id, "Cancellation observed at checkpoint");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Write progress through the store. A rejected write means the job is
    /// no longer processing.
    pub fn report(&self, percent: u8, stage: Stage, message: impl Into<String>) -> PipelineResult<()> {
        match self
            .store
            .update_progress(self.job_id, percent, stage, message)
        {
            Some(_) => Ok(()),
            None => Err(PipelineError::Cancelled),
        }
    }
}

/// Everything the pipeline calls out to.
#[derive(Clone)]
pub struct PipelineDeps {
    pub engine: Arc<dyn MatchingEngine>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// Run every stage for one job and return its result.
pub async fn run(
    ctx: JobContext,
    input: Arc<JobInput>,
    deps: PipelineDeps,
) -> PipelineResult<JobResult> {
    let total = input.resumes.len();

    // Extracting
    ctx.checkpoint()?;
    ctx.report(10, Stage::Extracting, "Extracting text from resume(s)...")?;
    let mut documents: Vec<(String, Result<ResumeDocument, String>)> = Vec::with_capacity(total);
    for artifact in &input.resumes {
        ctx.checkpoint()?;
        let loaded = deps
            .artifacts
            .load(artifact)
            .await
            .map_err(|e| e.to_string());
        if let Err(ref e) = loaded {
            warn!(job_id = %ctx.job_id(), file = %artifact.file_name, error = %e, "Failed to extract resume");
        }
        documents.push((artifact.file_name.clone(), loaded));
    }

    match input.kind {
        JobKind::Single => {
            if let Some((name, Err(e))) = documents.first() {
                return Err(PipelineError::Failed(format!(
                    "Failed to extract text from '{}': {}",
                    name, e
                )));
            }
        }
        JobKind::Batch => {
            if documents.iter().all(|(_, d)| d.is_err()) {
                return Err(PipelineError::Failed("No valid files to process".to_string()));
            }
        }
    }

    // Analyzing
    ctx.checkpoint()?;
    ctx.report(30, Stage::Analyzing, "Analyzing skills and keywords...")?;
    let engine = deps.engine.clone();
    let jd = input.job_description.clone();
    let profile = blocking(move || engine.analyze(&jd))
        .await?
        .map_err(|e| PipelineError::Failed(e.to_string()))?;
    let profile = Arc::new(profile);

    // Calculating
    ctx.checkpoint()?;
    ctx.report(
        CALCULATING_START,
        Stage::Calculating,
        "Calculating match scores...",
    )?;
    let mut results = Vec::with_capacity(total);
    for (i, (name, document)) in documents.into_iter().enumerate() {
        ctx.checkpoint()?;
        let result = match document {
            Ok(doc) => score(&deps, doc, profile.clone()).await,
            Err(e) => Err(e),
        };
        match (input.kind, result) {
            (_, Ok(r)) => results.push(r),
            (JobKind::Single, Err(e)) => return Err(PipelineError::Failed(e)),
            (JobKind::Batch, Err(e)) => results.push(MatchResult::failed(name, e)),
        }

        let span = u32::from(CALCULATING_END - CALCULATING_START);
        let done = (i + 1) as u32;
        let percent = CALCULATING_START as u32 + span * done / total as u32;
        ctx.report(
            percent as u8,
            Stage::Calculating,
            format!("Scored {} of {} resumes", done, total),
        )?;
    }

    let result = match input.kind {
        JobKind::Single => match results.into_iter().next() {
            Some(result) => JobResult::Single { result },
            None => return Err(PipelineError::Failed("No result produced".to_string())),
        },
        JobKind::Batch => {
            ctx.checkpoint()?;
            ctx.report(90, Stage::Ranking, "Ranking candidates...")?;
            rank_results(&mut results);
            JobResult::Batch { results }
        }
    };

    // Finalizing
    ctx.checkpoint()?;
    ctx.report(95, Stage::Finalizing, "Finalizing results...")?;
    Ok(result)
}

/// Score one document on the blocking pool.
///
/// A panic while scoring is reported as this document's failure.
async fn score(
    deps: &PipelineDeps,
    doc: ResumeDocument,
    profile: Arc<JobProfile>,
) -> Result<MatchResult, String> {
    let engine = deps.engine.clone();
    let name = doc.name.clone();
    match tokio::task::spawn_blocking(move || engine.score(&doc, &profile)).await {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(e) => {
            error!(resume = %name, error = %e, "Scoring task panicked");
            Err(format!("Failed to score resume: {}", e))
        }
    }
}

async fn blocking<T, F>(f: F) -> PipelineResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Failed(format!("Matching task failed: {}", e)))
}

/// Order by score, highest first, with failed items last; assign 1-based ranks.
///
/// The sort is stable, so equal scores keep submission order.
pub fn rank_results(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        a.is_error().cmp(&b.is_error()).then(
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(Ordering::Equal),
        )
    });
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = Some(i as u32 + 1);
    }
}
