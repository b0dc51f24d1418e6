//! resmatch-api - HTTP gateway for asynchronous resume matching
//!
//! Submissions return as soon as a job is queued; clients follow progress
//! over SSE or WebSocket and fetch the result once the job completes.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/health` | service health and job counts |
//! | `POST` | `/api/v1/match` | submit one resume |
//! | `POST` | `/api/v1/match/batch` | submit several resumes |
//! | `GET` | `/api/v1/jobs/:id` | job status |
//! | `POST` | `/api/v1/jobs/:id/cancel` | cancel a job |
//! | `GET` | `/api/v1/jobs/:id/result` | job result (`?consume=true` removes the job) |
//! | `GET` | `/api/v1/jobs/:id/events` | SSE progress stream |
//! | `GET` | `/api/v1/jobs/:id/ws` | WebSocket progress stream |

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

use handlers::{jobs, matching, stream};

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.cors_origins()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(jobs::health_check))
        .route("/api/v1/match", post(matching::submit_single))
        .route("/api/v1/match/batch", post(matching::submit_batch))
        .route("/api/v1/jobs/:id", get(jobs::get_job))
        .route("/api/v1/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/api/v1/jobs/:id/result", get(jobs::get_result))
        .route("/api/v1/jobs/:id/events", get(stream::job_events))
        .route("/api/v1/jobs/:id/ws", get(stream::job_ws))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        // Multipart uploads are bounded by the layer below, not axum's 2 MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
