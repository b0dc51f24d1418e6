//! Live progress bindings: Server-Sent Events and WebSocket.
//!
//! Both transports drain the same coalesced [`Subscription`]; a stream ends
//! after the job's terminal snapshot, after the idle timeout, or when the job
//! is removed.

use std::convert::Infallible;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures::{SinkExt, Stream, StreamExt};

use resmatch_core::JobId;
use resmatch_jobs::{StreamEvent, Subscription};

use crate::error::ApiError;
use crate::state::AppState;

/// SSE progress stream for one job.
///
/// Emits `progress` events carrying the snapshot JSON and `heartbeat` events
/// during silence. Unknown ids get 404 before the stream opens.
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.service.subscribe(id)?;
    tracing::debug!(job_id = %id, "SSE subscriber connected");

    let stream = subscription.into_stream().map(|event| {
        Ok(Event::default()
            .event(event.name())
            .data(event.payload().to_string()))
    });

    Ok(Sse::new(stream))
}

/// WebSocket progress stream for one job.
///
/// Server frames are JSON text `{"type": "progress"|"heartbeat"|"status"|"error", "data": ...}`.
/// The client may send `cancel` to cancel the job or `status` to receive the
/// current job state.
pub async fn job_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state.service.subscribe(id)?;
    Ok(ws.on_upgrade(move |socket| handle_job_socket(socket, state, id, subscription)))
}

fn frame(kind: &str, data: serde_json::Value) -> Message {
    Message::Text(serde_json::json!({ "type": kind, "data": data }).to_string())
}

fn event_frame(event: &StreamEvent) -> Message {
    frame(event.name(), event.payload())
}

/// Reply to a client command.
fn command_reply(state: &AppState, id: JobId, command: &str) -> Option<Message> {
    match command {
        "cancel" => match state.service.cancel(id) {
            Ok(_) => {
                tracing::info!(job_id = %id, "Job cancelled via WebSocket");
                // The cancelled snapshot arrives through the subscription.
                None
            }
            Err(e) => Some(frame("error", serde_json::json!({ "message": e.to_string() }))),
        },
        "status" => Some(match state.service.get_status(id) {
            Ok(job) => frame(
                "status",
                serde_json::to_value(&job).unwrap_or(serde_json::Value::Null),
            ),
            Err(e) => frame("error", serde_json::json!({ "message": e.to_string() })),
        }),
        other => Some(frame(
            "error",
            serde_json::json!({ "message": format!("Unknown command '{}'", other) }),
        )),
    }
}

async fn handle_job_socket(
    socket: WebSocket,
    state: AppState,
    id: JobId,
    mut subscription: Subscription,
) {
    tracing::debug!(job_id = %id, "WebSocket subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                if sender.send(event_frame(&event)).await.is_err() {
                    break;
                }
                if event.is_terminal() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = command_reply(&state, id, text.trim()) {
                            if sender.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    tracing::debug!(job_id = %id, "WebSocket subscriber disconnected");
}
