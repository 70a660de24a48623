//! Backend integration tests against an in-process HTTP server
//!
//! Each test serves canned provider responses from axum on an ephemeral port
//! and drives the real reqwest-based backends through them. Responses are
//! sliced into small body chunks so line and UTF-8 boundaries fall mid-chunk.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use advisor_core::backend::{
    build_client, ChatEndpointBackend, LlmBackend, LlmRequest, OllamaBackend, OpenAiBackend,
    StreamingToken,
};
use advisor_core::{
    Advisor, AdvisorConfig, ProviderError, RequestError, Schema, SessionOutcome, SessionState,
};

// =============================================================================
// Harness
// =============================================================================

type Seen = Arc<Mutex<Vec<Value>>>;

const DOCUMENT: &str = r#"{"title":"Épargne de précaution","description":"Three months of expenses","steps":[{"step":1,"action":"List fixed costs"},{"step":2,"action":"Automate a 50 € transfer"}],"tips":["Keep it liquid"]}"#;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on
async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(2), Duration::from_secs(5)).unwrap()
}

fn slices(body: &str, size: usize) -> Vec<Vec<u8>> {
    body.as_bytes().chunks(size).map(<[u8]>::to_vec).collect()
}

fn chunked(content_type: &'static str, parts: Vec<Vec<u8>>) -> Response {
    let stream = futures::stream::iter(parts.into_iter().map(Ok::<_, Infallible>));
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(stream))
        .unwrap()
}

/// POST route replaying `parts` and recording each request body
fn replay(content_type: &'static str, parts: Vec<Vec<u8>>, seen: Seen) -> MethodRouter {
    post(move |Json(body): Json<Value>| {
        seen.lock().unwrap().push(body);
        let parts = parts.clone();
        async move { chunked(content_type, parts) }
    })
}

fn failing(status: StatusCode, body: Value) -> MethodRouter {
    post(move || {
        let body = body.clone();
        async move { (status, Json(body)).into_response() }
    })
}

fn sse(deltas: &[&str], done: bool) -> String {
    let mut body: String = deltas
        .iter()
        .map(|d| format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": d } }] })))
        .collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

fn ndjson(deltas: &[&str], done: bool) -> String {
    let mut body: String = deltas
        .iter()
        .map(|d| format!("{}\n", json!({ "model": "llama3.2", "response": d, "done": false })))
        .collect();
    if done {
        body.push_str(&format!("{}\n", json!({ "model": "llama3.2", "response": "", "done": true })));
    }
    body
}

/// Split a document into uneven deltas on char boundaries
fn deltas(document: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = document;
    let mut width = 3;
    while !rest.is_empty() {
        let mut cut = width.min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (head, tail) = rest.split_at(cut);
        out.push(head);
        rest = tail;
        width = width % 11 + 4;
    }
    out
}

async fn drain(mut rx: mpsc::Receiver<StreamingToken>) -> Vec<StreamingToken> {
    let mut tokens = Vec::new();
    while let Some(token) = rx.recv().await {
        tokens.push(token);
    }
    tokens
}

fn joined(tokens: &[StreamingToken]) -> String {
    tokens
        .iter()
        .filter_map(|t| match t {
            StreamingToken::Token(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn advisor_for(backend: Arc<dyn LlmBackend>) -> Advisor {
    Advisor::new(backend, AdvisorConfig::default())
}

// =============================================================================
// OpenAI-compatible SSE
// =============================================================================

#[tokio::test]
async fn test_openai_sse_stream_validates_final_answer() {
    let seen = Seen::default();
    let body = sse(&deltas(DOCUMENT), true);
    let router = Router::new().route(
        "/v1/chat/completions",
        replay("text/event-stream", slices(&body, 7), seen.clone()),
    );
    let addr = serve(router).await;

    let backend = OpenAiBackend::new("sk-test", format!("http://{addr}/v1/"), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let view = advisor.ask("How do I build an emergency fund?").await.unwrap();

    assert_eq!(view.state, SessionState::Completed);
    let Some(SessionOutcome::Validated { answer }) = view.outcome.clone() else {
        panic!("expected a validated answer, got {:?}", view.outcome);
    };
    assert_eq!(answer.title, "Épargne de précaution");
    assert_eq!(answer.steps.as_ref().map(Vec::len), Some(2));
    assert_eq!(
        view.answer.and_then(|a| a.tips),
        Some(vec!["Keep it liquid".to_string()])
    );
    assert!(advisor.active_sessions().is_empty());

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["stream"], json!(true));
    assert_eq!(requests[0]["response_format"]["type"], json!("json_schema"));
    assert_eq!(
        requests[0]["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str()),
        Some("How do I build an emergency fund?")
    );
}

#[tokio::test]
async fn test_openai_mid_stream_error_keeps_partial_answer() {
    let mut body = sse(&[r#"{"title":"Pay down"#, r#" debt","steps":[{"act"#], false);
    body.push_str("data: {\"error\":{\"message\":\"server overloaded\"}}\n\n");
    body.push_str(&sse(&["ion\":\"never seen\"}]}"], true));
    let router = Router::new().route(
        "/v1/chat/completions",
        replay("text/event-stream", slices(&body, 16), Seen::default()),
    );
    let addr = serve(router).await;

    let backend = OpenAiBackend::new("", format!("http://{addr}/v1"), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let view = advisor.ask("Should I pay off debt first?").await.unwrap();

    assert_eq!(view.state, SessionState::Completed);
    assert_eq!(
        view.outcome,
        Some(SessionOutcome::Interrupted {
            reason: "server overloaded".to_string()
        })
    );
    let answer = view.answer.unwrap();
    assert_eq!(answer.title.as_deref(), Some("Pay down debt"));
    assert_eq!(answer.steps.map(|s| s.len()), Some(1));
}

// =============================================================================
// Ollama NDJSON
// =============================================================================

#[tokio::test]
async fn test_ollama_deltas_arrive_in_order() {
    let seen = Seen::default();
    let body = ndjson(&deltas(DOCUMENT), true);
    let router = Router::new().route(
        "/api/generate",
        replay("application/x-ndjson", slices(&body, 5), seen.clone()),
    );
    let addr = serve(router).await;

    let backend = OllamaBackend::new("127.0.0.1", addr.port(), client());
    let request = LlmRequest::new("emergency fund", "llama3.2").with_schema(Schema::answer());
    let tokens = drain(backend.send_streaming(&request).await.unwrap()).await;

    assert_eq!(joined(&tokens), DOCUMENT);
    assert_eq!(tokens.last(), Some(&StreamingToken::Complete));
    assert_eq!(
        tokens.iter().filter(|t| **t == StreamingToken::Complete).count(),
        1
    );

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0]["model"], json!("llama3.2"));
    assert_eq!(requests[0]["stream"], json!(true));
    assert!(requests[0]["format"].is_object());
}

#[tokio::test]
async fn test_ollama_truncated_body_is_interrupted() {
    let cut = &DOCUMENT[..DOCUMENT.find(r#","tips""#).unwrap()];
    let body = ndjson(&deltas(cut), false);
    let router = Router::new().route(
        "/api/generate",
        replay("application/x-ndjson", slices(&body, 9), Seen::default()),
    );
    let addr = serve(router).await;

    let backend = OllamaBackend::new("127.0.0.1", addr.port(), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let view = advisor.ask("emergency fund").await.unwrap();

    assert_eq!(view.state, SessionState::Completed);
    assert!(matches!(view.outcome, Some(SessionOutcome::Interrupted { .. })));
    let answer = view.answer.unwrap();
    assert_eq!(answer.title.as_deref(), Some("Épargne de précaution"));
    assert_eq!(answer.steps.map(|s| s.len()), Some(2));
    assert_eq!(answer.tips, None);
}

#[tokio::test]
async fn test_ollama_health_check() {
    let router = Router::new().route("/api/tags", get(|| async { Json(json!({ "models": [] })) }));
    let addr = serve(router).await;
    assert!(OllamaBackend::new("127.0.0.1", addr.port(), client()).health_check().await);

    let dead = closed_addr().await;
    assert!(!OllamaBackend::new("127.0.0.1", dead.port(), client()).health_check().await);
}

// =============================================================================
// Daemon /chat endpoint
// =============================================================================

#[tokio::test]
async fn test_chat_endpoint_forwards_raw_text() {
    let seen = Seen::default();
    let router = Router::new().route(
        "/chat",
        replay("text/plain; charset=utf-8", slices(DOCUMENT, 4), seen.clone()),
    );
    let addr = serve(router).await;

    let backend = ChatEndpointBackend::new(format!("http://{addr}"), client());
    let tokens = drain(
        backend
            .send_streaming(&LlmRequest::new("emergency fund", "ignored"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(joined(&tokens), DOCUMENT);
    assert_eq!(tokens.last(), Some(&StreamingToken::Complete));
    assert_eq!(seen.lock().unwrap()[0], json!({ "prompt": "emergency fund" }));
}

#[tokio::test]
async fn test_chat_endpoint_drives_advisor_and_watchers() {
    let router = Router::new().route(
        "/chat",
        replay("text/plain; charset=utf-8", slices(DOCUMENT, 6), Seen::default()),
    );
    let addr = serve(router).await;

    let backend = ChatEndpointBackend::new(format!("http://{addr}"), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let session_id = advisor.submit("emergency fund").await.unwrap();
    let mut view = advisor.subscribe(&session_id).unwrap();
    assert_eq!(view.borrow().state, SessionState::Receiving);

    while advisor.is_active(&session_id) {
        advisor.next_events(&session_id).await;
    }

    let last = view.borrow_and_update().clone();
    assert_eq!(last.state, SessionState::Completed);
    assert!(matches!(last.outcome, Some(SessionOutcome::Validated { .. })));
    assert!(last.chunk_count >= 1);
    assert!(last.answer.is_some_and(|a| a.title.is_some()));
}

// =============================================================================
// Pre-stream failures
// =============================================================================

#[tokio::test]
async fn test_provider_500_is_one_error_with_no_publications() {
    let router = Router::new().route(
        "/v1/chat/completions",
        failing(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": { "message": "model not loaded" } }),
        ),
    );
    let addr = serve(router).await;

    let backend = OpenAiBackend::new("sk-test", format!("http://{addr}/v1"), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let err = advisor.ask("How much should I save?").await.unwrap_err();

    match err {
        RequestError::Provider(ProviderError::Status { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "model not loaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(advisor.active_sessions().is_empty());
    assert!(advisor.poll_streaming().is_empty());
}

#[tokio::test]
async fn test_ollama_string_error_body() {
    let router = Router::new().route(
        "/api/generate",
        failing(StatusCode::NOT_FOUND, json!({ "error": "model 'nope' not found" })),
    );
    let addr = serve(router).await;

    let backend = OllamaBackend::new("127.0.0.1", addr.port(), client());
    let err = backend
        .send_streaming(&LlmRequest::new("hi", "nope"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "provider returned 404: model 'nope' not found");
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    let dead = closed_addr().await;
    let backend = ChatEndpointBackend::new(format!("http://{dead}"), client());
    let mut advisor = advisor_for(Arc::new(backend));

    let err = advisor.ask("hello").await.unwrap_err();

    assert!(matches!(err, RequestError::Provider(ProviderError::Transport(_))));
    assert!(advisor.active_sessions().is_empty());
}
