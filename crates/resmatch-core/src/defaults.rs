//! Centralized default constants for the resmatch system.
//!
//! **This module is the single source of truth** for shared default values.
//! Every `from_env()` constructor falls back to these when its variable is
//! unset or unparsable.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum size of a single uploaded resume (5 MiB).
pub const MAX_UPLOAD_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Default directory for uploaded artifacts awaiting processing.
pub const UPLOAD_DIR: &str = "data/uploads";

/// File extensions accepted for resume uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

// =============================================================================
// JOBS
// =============================================================================

/// Number of background workers draining the job queue.
pub const WORKER_COUNT: usize = 2;

/// Upper bound on a single job's pipeline run.
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Maximum resumes accepted in one batch submission.
pub const MAX_BATCH_SIZE: usize = 50;

// =============================================================================
// PROGRESS STREAMING
// =============================================================================

/// Minimum progress increase (points) that forwards a snapshot immediately.
pub const PROGRESS_MIN_DELTA: u8 = 5;

/// Minimum time between forwarded snapshots when progress barely moves.
pub const PROGRESS_MIN_INTERVAL_MS: u64 = 500;

/// Silence after which a subscriber receives a heartbeat.
pub const STREAM_HEARTBEAT_SECS: u64 = 30;

/// A subscription ends after this long without a real progress update.
pub const STREAM_IDLE_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// RETENTION
// =============================================================================

/// How long terminal jobs and their results are kept.
pub const JOB_RETENTION_SECS: u64 = 3600;

/// How often the expiry sweeper runs.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

// =============================================================================
// MATCHING
// =============================================================================

/// Weight of the skill overlap score in the overall score.
pub const SKILL_MATCH_WEIGHT: f64 = 0.6;

/// Weight of the TF-IDF text similarity in the overall score.
pub const TEXT_SIMILARITY_WEIGHT: f64 = 0.2;

/// Weight of the semantic similarity in the overall score.
pub const SEMANTIC_SIMILARITY_WEIGHT: f64 = 0.2;

/// Text is truncated to this many characters before TF-IDF scoring.
pub const TEXT_SIMILARITY_MAX_CHARS: usize = 50_000;

/// Text is truncated to this many characters before semantic scoring.
pub const SEMANTIC_SIMILARITY_MAX_CHARS: usize = 10_000;
