//! Data models for matching jobs, their inputs, results, and progress snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, never-reused job identifier (UUIDv7, time-ordered).
pub type JobId = Uuid;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    Uuid::now_v7()
}

// =============================================================================
// JOB KIND / STATUS / STAGE
// =============================================================================

/// Whether a job scores one resume or ranks several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Single,
    Batch,
}

impl JobKind {
    /// Front-end page that renders this kind of result.
    pub fn redirect_url(&self, id: JobId) -> String {
        match self {
            JobKind::Single => format!("/results?id={}", id),
            JobKind::Batch => format!("/batch-results?id={}", id),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Batch => "batch",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job.
///
/// Transitions only move forward: `queued -> processing -> {completed|error|cancelled}`,
/// plus `queued -> cancelled` for jobs cancelled before a worker picks them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Completed, error, and cancelled admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,
            (JobStatus::Processing, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Error) => true,
            (JobStatus::Processing, JobStatus::Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named phase of the matching pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Extracting,
    Analyzing,
    Calculating,
    Ranking,
    Finalizing,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Extracting => "extracting",
            Stage::Analyzing => "analyzing",
            Stage::Calculating => "calculating",
            Stage::Ranking => "ranking",
            Stage::Finalizing => "finalizing",
            Stage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// INPUTS
// =============================================================================

/// Reference to a stored resume artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Storage key, unique per upload.
    pub key: String,
    /// Original (sanitized) file name, used for display and type detection.
    pub file_name: String,
}

impl ArtifactRef {
    pub fn new(key: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            file_name: file_name.into(),
        }
    }

    /// Lowercased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Immutable submission payload. Never mutated after the job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub kind: JobKind,
    pub resumes: Vec<ArtifactRef>,
    pub job_description: String,
}

impl JobInput {
    pub fn single(resume: ArtifactRef, job_description: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Single,
            resumes: vec![resume],
            job_description: job_description.into(),
        }
    }

    pub fn batch(resumes: Vec<ArtifactRef>, job_description: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Batch,
            resumes,
            job_description: job_description.into(),
        }
    }
}

/// Resume content loaded from the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeDocument {
    pub name: String,
    pub text: String,
}

/// A job description analyzed once and shared by every resume of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProfile {
    pub text: String,
    pub skills: Vec<String>,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Matching engine output for one resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub resume_name: String,
    pub overall_score: f64,
    pub skill_match: f64,
    pub text_similarity: f64,
    pub semantic_similarity: f64,
    pub matching_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub resume_skills: Vec<String>,
    pub jd_skills: Vec<String>,
    /// 1-based position within a batch, highest score first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Set when this resume could not be processed; scores are zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchResult {
    /// Per-item error result used inside batches.
    pub fn failed(resume_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            resume_name: resume_name.into(),
            overall_score: 0.0,
            skill_match: 0.0,
            text_similarity: 0.0,
            semantic_similarity: 0.0,
            matching_skills: Vec::new(),
            missing_skills: Vec::new(),
            resume_skills: Vec::new(),
            jd_skills: Vec::new(),
            rank: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Stored outcome of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Single { result: MatchResult },
    Batch { results: Vec<MatchResult> },
}

impl JobResult {
    pub fn kind(&self) -> JobKind {
        match self {
            JobResult::Single { .. } => JobKind::Single,
            JobResult::Batch { .. } => JobKind::Batch,
        }
    }
}

// =============================================================================
// JOB + SNAPSHOT
// =============================================================================

/// A matching job tracked end-to-end by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0..=100, non-decreasing while processing.
    pub progress: u8,
    pub stage: Stage,
    pub message: String,
    pub resume_count: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl Job {
    /// New job in status `queued`.
    pub fn new(id: JobId, input: &JobInput) -> Self {
        Self {
            id,
            kind: input.kind,
            status: JobStatus::Queued,
            progress: 0,
            stage: Stage::Queued,
            message: "Waiting for an available worker...".to_string(),
            resume_count: input.resumes.len(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            redirect_url: None,
        }
    }

    /// Wire-level view of this job, as pushed to subscribers.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.status == JobStatus::Completed;
        ProgressSnapshot {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            stage: self.stage,
            message: self.message.clone(),
            redirect_url: if completed {
                self.redirect_url.clone()
            } else {
                None
            },
            result_url: completed.then(|| result_url(self.id)),
        }
    }
}

/// API path serving a job's result.
pub fn result_url(id: JobId) -> String {
    format!("/api/v1/jobs/{}/result", id)
}

/// Progress event shape: `{status, progress, stage, message, redirect_url?}`.
///
/// Completed snapshots additionally carry a result reference; error and
/// cancelled snapshots carry a message only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl ProgressSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
    pub total: usize,
}
