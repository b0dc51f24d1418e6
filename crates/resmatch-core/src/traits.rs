//! Core traits for resmatch abstractions.
//!
//! The job pipeline depends only on these interfaces, so the matching
//! engine and artifact storage can be swapped or faked in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// MATCHING ENGINE
// =============================================================================

/// Scores resumes against a job description.
///
/// Calls are CPU-bound and synchronous; callers running on an async runtime
/// are expected to move them off the reactor.
pub trait MatchingEngine: Send + Sync {
    /// Analyze a job description once so it can be reused across resumes.
    fn analyze(&self, job_description: &str) -> Result<JobProfile>;

    /// Score one resume against an analyzed job description.
    fn score(&self, resume: &ResumeDocument, profile: &JobProfile) -> Result<MatchResult>;
}

// =============================================================================
// ARTIFACT STORE
// =============================================================================

/// Holds uploaded resume artifacts until their job finishes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an upload and return a reference to it.
    async fn put(&self, file_name: &str, data: &[u8]) -> Result<ArtifactRef>;

    /// Whether the referenced artifact is still present.
    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool>;

    /// Load and decode an artifact into plain text.
    async fn load(&self, artifact: &ArtifactRef) -> Result<ResumeDocument>;

    /// Release the artifact. Releasing a missing artifact is not an error.
    async fn release(&self, artifact: &ArtifactRef) -> Result<()>;
}
