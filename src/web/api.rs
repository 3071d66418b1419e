//! Defines the Axum API routes and handlers.
//!
//! `POST /api/v1/print` and `POST /api/v1/commands` take plain-text bodies,
//! matching the `printer/print` and `printer/commands` control topics.
//! `GET /api/v1/events` streams every outbound event as one JSON object per line.

use crate::communication::BroadcastSink;
use crate::web::models::{CommandResponse, SubmitJobResponse};
use crate::web::printer_channel::PrinterRequest;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::Stream;
use relay_shared::{PrintJobError, PrinterEvent};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub struct AppStateInner {
    pub printer_tx: Sender<PrinterRequest>,
    pub events: BroadcastSink,
}
pub type AppState = Arc<AppStateInner>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(printer_tx: Sender<PrinterRequest>, events: BroadcastSink) -> Router {
    create_router_with_state(Arc::new(AppStateInner { printer_tx, events }))
}

pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/print", post(submit_job))
        .route("/api/v1/commands", post(send_command))
        .route("/api/v1/events", get(stream_events))
        .with_state(state)
}

/// Send a request to the control loop and wait for its answer.
async fn request<T>(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<T>) -> PrinterRequest,
) -> Option<T> {
    let (resp_tx, resp_rx) = oneshot::channel();
    state.printer_tx.send(build(resp_tx)).await.ok()?;
    resp_rx.await.ok()
}

/// Handler to get the current job state.
async fn get_status(State(state): State<AppState>) -> Response {
    match request(&state, |respond_to| PrinterRequest::GetStatus { respond_to }).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler to start a job; the body is the job file path.
async fn submit_job(State(state): State<AppState>, path: String) -> Response {
    let reply = request(&state, |respond_to| PrinterRequest::SubmitJob {
        path: path.trim().to_string(),
        respond_to,
    })
    .await;
    match reply {
        Some(Ok(job_id)) => (StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })).into_response(),
        Some(Err(e)) => {
            let status = match e {
                PrintJobError::AlreadyPrinting => StatusCode::CONFLICT,
                PrintJobError::InputNotFound(_) => StatusCode::NOT_FOUND,
                PrintJobError::Input(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            json_error(&e.to_string(), status)
        }
        None => json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler to run a runtime command; the body is the command text.
/// Unknown commands are accepted with `accepted: false`.
async fn send_command(State(state): State<AppState>, message: String) -> Response {
    let reply = request(&state, |respond_to| PrinterRequest::Command { message, respond_to }).await;
    match reply {
        Some(Ok(command)) => {
            let response = CommandResponse {
                accepted: command.is_some(),
                command,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Some(Err(e)) => json_error(&e.to_string(), StatusCode::BAD_GATEWAY),
        None => json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler streaming events as newline-delimited JSON.
async fn stream_events(State(state): State<AppState>) -> Response {
    let body = Body::from_stream(event_lines(state.events.subscribe()));
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

fn event_json(event: &PrinterEvent) -> serde_json::Value {
    serde_json::json!({
        "topic": event.topic(),
        "kind": event.kind,
        "payload": event.payload,
        "timestamp": event.timestamp,
    })
}

fn event_lines(
    mut events: broadcast::Receiver<PrinterEvent>,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    async_stream::stream! {
        loop {
            match events.recv().await {
                Ok(event) => yield Ok(format!("{}\n", event_json(&event))),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event stream lagging, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
