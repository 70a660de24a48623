//! HTTP Server Implementation
//!
//! The daemon is the transport in front of the pipeline:
//! - `POST /chat` checks the prompt, opens a provider stream and relays the
//!   raw deltas as a chunked `text/plain` body
//! - `GET /health` reports whether the configured provider is reachable
//!
//! ```text
//!   client ──POST /chat──▶ chat() ──send_streaming──▶ LlmBackend
//!                             │                          │ StreamingToken
//!                             ▼                          ▼
//!                      chunked body ◀──mpsc── relay() ──▶ AnswerAccumulator
//!                                                          (outcome logging)
//! ```
//!
//! A failure before the first byte is a JSON error with a status code. Once
//! the body has started, a provider error aborts it so the client sees an
//! interrupted transfer rather than a clean end.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use advisor_core::{
    check_prompt, AdvisorConfig, AnswerAccumulator, FinalOutcome, LlmBackend, RequestError,
    Schema, SessionId, StreamingToken,
};

/// Chunks buffered between the relay task and the response body
const BODY_CHANNEL_CAPACITY: usize = 32;

/// Shared state for all handlers
pub struct AppState {
    /// Provider backend
    pub backend: Arc<dyn LlmBackend>,
    /// Request settings
    pub advisor: AdvisorConfig,
    /// Answer schema sent to the provider and used for outcome logging
    pub schema: Schema,
}

impl AppState {
    /// State for the answer schema
    pub fn new(backend: Arc<dyn LlmBackend>, advisor: AdvisorConfig) -> Self {
        Self {
            backend,
            advisor,
            schema: Schema::answer(),
        }
    }
}

/// Body of `POST /chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    #[serde(default)]
    pub prompt: String,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight responses
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// A request that failed before the body started
enum ApiError {
    /// The body was not a JSON `{prompt}` object
    Body(JsonRejection),
    /// The prompt or the provider was refused
    Request(RequestError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::Request(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Body(rejection) => rejection.status(),
            Self::Request(RequestError::EmptyPrompt) => StatusCode::BAD_REQUEST,
            Self::Request(RequestError::PromptTooLong { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Request(RequestError::Provider(_)) => StatusCode::BAD_GATEWAY,
            Self::Request(RequestError::Stream(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Request(RequestError::Session(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Body(rejection) => rejection.body_text(),
            Self::Request(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::new();
    let Json(body) = payload.map_err(|rejection| {
        warn!(%session_id, error = %rejection.body_text(), "Rejected request body");
        ApiError::from(rejection)
    })?;

    let prompt = check_prompt(&body.prompt, state.advisor.max_prompt_length).map_err(|e| {
        warn!(%session_id, error = %e, "Rejected prompt");
        ApiError::from(e)
    })?;

    let request = state.advisor.request(prompt, &state.schema);
    let tokens = state.backend.send_streaming(&request).await.map_err(|e| {
        error!(
            %session_id,
            backend = state.backend.name(),
            error = %e,
            "Provider failed before streaming"
        );
        ApiError::from(RequestError::from(e))
    })?;

    info!(%session_id, backend = state.backend.name(), model = %request.model, "Streaming answer");

    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let accumulator = AnswerAccumulator::with_schema(state.schema.clone());
    tokio::spawn(relay(session_id, tokens, accumulator, tx));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

/// Forward provider deltas to the response body
///
/// Stops reading the provider as soon as the client goes away.
async fn relay(
    session_id: SessionId,
    mut tokens: mpsc::Receiver<StreamingToken>,
    mut accumulator: AnswerAccumulator,
    body: mpsc::Sender<Result<String, io::Error>>,
) {
    let interruption = loop {
        match tokens.recv().await {
            Some(StreamingToken::Token(delta)) => {
                let _ = accumulator.push_str(&delta);
                if body.send(Ok(delta)).await.is_err() {
                    info!(%session_id, "Client disconnected; dropping provider stream");
                    return;
                }
            }
            Some(StreamingToken::Complete) => break None,
            Some(StreamingToken::Error(message)) => break Some(message),
            None => break Some("provider stream closed unexpectedly".to_string()),
        }
    };

    if let Some(ref reason) = interruption {
        let _ = body.send(Err(io::Error::other(reason.clone()))).await;
    }
    log_outcome(&session_id, &mut accumulator, interruption.as_deref());
}

fn log_outcome(
    session_id: &SessionId,
    accumulator: &mut AnswerAccumulator,
    interruption: Option<&str>,
) {
    let chunks = accumulator.stats().chunks;
    match accumulator.finish().outcome {
        FinalOutcome::Validated(answer) => {
            info!(%session_id, chunks, title = %answer.title, "Answer validated");
        }
        FinalOutcome::Incomplete => {
            let reason = interruption.unwrap_or("stream ended before the answer was complete");
            warn!(%session_id, chunks, %reason, "Stream interrupted");
        }
        FinalOutcome::Violation(violation) => {
            warn!(%session_id, chunks, error = %violation, "Final answer violates schema");
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let backend = state.backend.name();
    if state.backend.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok", "backend": backend }))).into_response()
    } else {
        warn!(backend, "Backend health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "backend": backend })),
        )
            .into_response()
    }
}
