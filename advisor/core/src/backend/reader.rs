//! Response body readers shared by the HTTP backends
//!
//! Each reader runs as its own task, forwards deltas in arrival order, and
//! stops as soon as the receiving side is dropped.

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::traits::StreamingToken;
use crate::codec::{LineBuffer, Utf8Decoder};
use crate::error::ProviderError;

/// Capacity of the channel between a reader task and its consumer
pub(crate) const CHANNEL_CAPACITY: usize = 100;

/// What one framed line of a provider stream carries
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LineFrame {
    /// Text delta, if the line carried one
    pub delta: Option<String>,
    /// Whether the provider signalled the end of the response
    pub done: bool,
}

impl LineFrame {
    pub(crate) fn skip() -> Self {
        Self::default()
    }

    pub(crate) fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            done: false,
        }
    }

    pub(crate) fn done() -> Self {
        Self {
            delta: None,
            done: true,
        }
    }
}

/// Turn a non-success response into a [`ProviderError`]
///
/// Understands `{"error": "..."}` and `{"error": {"message": "..."}}` bodies;
/// anything else is reported verbatim.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.trim().to_string()
            }
        }),
    })
}

/// Extract an error message from a JSON error body
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(error) => error.get("message")?.as_str().map(str::to_string),
        _ => None,
    }
}

async fn forward(tx: &mpsc::Sender<StreamingToken>, token: StreamingToken) -> bool {
    tx.send(token).await.is_ok()
}

/// Spawn a task reading a line-framed body (SSE or NDJSON)
///
/// `parse_line` maps one line to a frame, or to an error message that ends the
/// stream.
pub(crate) fn spawn_line_reader<F>(
    backend: &'static str,
    response: reqwest::Response,
    mut parse_line: F,
) -> mpsc::Receiver<StreamingToken>
where
    F: FnMut(&str) -> Result<LineFrame, String> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut lines = LineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(backend, error = %e, "Stream interrupted");
                    let _ = forward(&tx, StreamingToken::Error(e.to_string())).await;
                    return;
                }
            };

            for line in lines.push(&bytes) {
                if !handle_line(backend, &tx, &line, &mut parse_line).await {
                    return;
                }
            }
        }

        if let Some(line) = lines.finish() {
            if !handle_line(backend, &tx, &line, &mut parse_line).await {
                return;
            }
        }

        tracing::debug!(backend, "Body ended without a completion marker");
        let _ = forward(&tx, StreamingToken::Complete).await;
    });

    rx
}

/// Returns `false` once the reader should stop
async fn handle_line<F>(
    backend: &'static str,
    tx: &mpsc::Sender<StreamingToken>,
    line: &str,
    parse_line: &mut F,
) -> bool
where
    F: FnMut(&str) -> Result<LineFrame, String>,
{
    if line.trim().is_empty() {
        return true;
    }

    match parse_line(line) {
        Ok(frame) => {
            if let Some(delta) = frame.delta.filter(|d| !d.is_empty()) {
                if !forward(tx, StreamingToken::Token(delta)).await {
                    tracing::debug!(backend, "Receiver dropped, stopping stream");
                    return false;
                }
            }
            if frame.done {
                let _ = forward(tx, StreamingToken::Complete).await;
                return false;
            }
            true
        }
        Err(message) => {
            tracing::warn!(backend, error = %message, "Provider reported an error mid-stream");
            let _ = forward(tx, StreamingToken::Error(message)).await;
            false
        }
    }
}

/// Spawn a task forwarding every decoded body chunk as a delta
pub(crate) fn spawn_text_reader(
    backend: &'static str,
    response: reqwest::Response,
) -> mpsc::Receiver<StreamingToken> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut decoder = Utf8Decoder::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() && !forward(&tx, StreamingToken::Token(text)).await {
                        tracing::debug!(backend, "Receiver dropped, stopping stream");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(backend, error = %e, "Stream interrupted");
                    let _ = forward(&tx, StreamingToken::Error(e.to_string())).await;
                    return;
                }
            }
        }

        if let Some(rest) = decoder.finish() {
            if !forward(&tx, StreamingToken::Token(rest)).await {
                return;
            }
        }
        let _ = forward(&tx, StreamingToken::Complete).await;
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"error":"boom"}"#), Some("boom".to_string()));
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            Some("bad key".to_string())
        );
        assert_eq!(error_message(r#"{"detail":"x"}"#), None);
        assert_eq!(error_message("<html>"), None);
    }

    #[test]
    fn test_line_frame_constructors() {
        assert_eq!(LineFrame::skip(), LineFrame::default());
        assert_eq!(LineFrame::delta("a").delta.as_deref(), Some("a"));
        assert!(LineFrame::done().done);
    }
}
