//! Submission handlers.
//!
//! Uploads are validated and stored in the artifact store, then handed to the
//! job service, which returns as soon as the job is queued.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use resmatch_core::{validate_upload, ArtifactRef, JobId, JobStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub status_url: String,
    pub events_url: String,
    pub ws_url: String,
}

impl SubmitResponse {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            status_url: format!("/api/v1/jobs/{}", job_id),
            events_url: format!("/api/v1/jobs/{}/events", job_id),
            ws_url: format!("/api/v1/jobs/{}/ws", job_id),
        }
    }
}

/// An uploaded file read from a multipart field.
struct Upload {
    file_name: String,
    data: Vec<u8>,
}

/// Everything a submission form carries.
#[derive(Default)]
struct SubmitForm {
    uploads: Vec<Upload>,
    job_description: String,
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<SubmitForm, ApiError> {
    let mut form = SubmitForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some(name) if name == file_field => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec();
                form.uploads.push(Upload { file_name, data });
            }
            Some("job_description") => {
                form.job_description = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
            }
            _ => {} // ignore unknown fields
        }
    }

    Ok(form)
}

/// Drop stored artifacts after a rejected submission.
async fn release_all(state: &AppState, artifacts: &[ArtifactRef]) {
    for artifact in artifacts {
        if let Err(e) = state.service.artifacts().release(artifact).await {
            warn!(file = %artifact.file_name, error = %e, "Failed to release artifact");
        }
    }
}

/// Submit one resume for matching.
///
/// # Multipart Fields
/// - `resume`: resume file, `.pdf`, `.txt` or `.md` (required)
/// - `job_description`: job description text (required)
///
/// # Returns
/// - 202 Accepted with the job id and its status, SSE and WebSocket URLs
/// - 400 Bad Request if the file or job description is missing or invalid
pub async fn submit_single(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let form = read_form(multipart, "resume").await?;
    let upload = form
        .uploads
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("No resume provided".to_string()))?;
    if form.job_description.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "No job description provided".to_string(),
        ));
    }

    validate_upload(
        &upload.file_name,
        &upload.data,
        state.config.max_upload_size_bytes,
    )?;
    let artifact = state
        .service
        .artifacts()
        .put(&upload.file_name, &upload.data)
        .await?;

    match state
        .service
        .submit_single(artifact.clone(), &form.job_description)
        .await
    {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(SubmitResponse::new(job_id)))),
        Err(e) => {
            release_all(&state, &[artifact]).await;
            Err(e.into())
        }
    }
}

/// Submit several resumes to be ranked against one job description.
///
/// Files that are empty, oversized, or of an unsupported type are skipped.
///
/// # Multipart Fields
/// - `resumes`: resume files, repeated (at least one must be valid)
/// - `job_description`: job description text (required)
///
/// # Returns
/// - 202 Accepted with the job id and its status, SSE and WebSocket URLs
/// - 400 Bad Request if no file could be accepted or the job description is missing
pub async fn submit_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let form = read_form(multipart, "resumes").await?;
    if form.uploads.is_empty() {
        return Err(ApiError::BadRequest("No resumes provided".to_string()));
    }
    if form.job_description.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "No job description provided".to_string(),
        ));
    }
    if form.uploads.len() > state.config.max_batch_size {
        return Err(ApiError::BadRequest(format!(
            "Too many resumes: {} (maximum {})",
            form.uploads.len(),
            state.config.max_batch_size
        )));
    }

    let received = form.uploads.len();
    let mut artifacts = Vec::with_capacity(received);
    for upload in form.uploads {
        if let Err(e) = validate_upload(
            &upload.file_name,
            &upload.data,
            state.config.max_upload_size_bytes,
        ) {
            warn!(file = %upload.file_name, error = %e, "Skipping rejected upload");
            continue;
        }
        match state
            .service
            .artifacts()
            .put(&upload.file_name, &upload.data)
            .await
        {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => warn!(file = %upload.file_name, error = %e, "Skipping unsaved upload"),
        }
    }

    if artifacts.is_empty() {
        return Err(ApiError::BadRequest("No valid files to process".to_string()));
    }
    debug!(received, accepted = artifacts.len(), "Batch uploads stored");

    match state
        .service
        .submit_batch(artifacts.clone(), &form.job_description)
        .await
    {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(SubmitResponse::new(job_id)))),
        Err(e) => {
            release_all(&state, &artifacts).await;
            Err(e.into())
        }
    }
}
