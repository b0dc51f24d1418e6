//! Job status, cancellation, and result handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use resmatch_core::{Job, JobId, JobResult};

use crate::error::ApiError;
use crate::state::AppState;

/// Current snapshot of a job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.service.get_status(id)?))
}

/// Cancel a queued or processing job.
///
/// # Returns
/// - 200 OK with the cancelled job
/// - 404 Not Found for an unknown id
/// - 409 Conflict if the job already finished
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, ApiError> {
    let job = state.service.cancel(id)?;
    info!(job_id = %id, "Job cancelled via API");
    Ok(Json(job))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultQuery {
    /// Remove the job once its result has been read.
    #[serde(default)]
    pub consume: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub job_id: JobId,
    #[serde(flatten)]
    pub result: JobResult,
}

/// Result of a completed job.
///
/// # Returns
/// - 200 OK with the single result or the ranked batch results
/// - 202 Accepted while the job is queued or processing
/// - 404 Not Found for an unknown, expired, or consumed job
/// - 409 Conflict if the job failed or was cancelled
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Query(query): Query<ResultQuery>,
) -> Result<Json<ResultResponse>, ApiError> {
    let result = if query.consume {
        state.service.consume_result(id)?
    } else {
        state.service.get_result(id)?
    };
    Ok(Json(ResultResponse { job_id: id, result }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "queue_depth": state.service.queue_depth(),
        "jobs": state.service.stats(),
    }))
}
