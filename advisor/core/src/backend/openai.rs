//! OpenAI-compatible Backend
//!
//! Streams `/chat/completions` with a strict `json_schema` response format.
//! The body is server-sent events: `data: {...}` lines whose
//! `choices[0].delta.content` carries the next slice of text, terminated by
//! `data: [DONE]`. Works with any server speaking the same protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::reader::{check_status, spawn_line_reader, LineFrame};
use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use crate::error::ProviderError;

/// Default API base
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible backend client
#[derive(Clone)]
pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend sharing `http_client`
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }


    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn build_body(request: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "temperature": request.temperature,
        });

        if request.max_tokens > 0 {
            body["max_tokens"] = json!(request.max_tokens);
        }
        if let Some(ref schema) = request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.to_json_schema(),
                },
            });
        }

        body
    }
}

/// Parse one SSE line
///
/// Only `data:` fields matter; comments, `event:` and `id:` lines are skipped.
fn parse_line(line: &str) -> Result<LineFrame, String> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(LineFrame::skip());
    };
    let payload = payload.trim_start();

    if payload == "[DONE]" {
        return Ok(LineFrame::done());
    }

    let data: Value = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed SSE event");
            return Ok(LineFrame::skip());
        }
    };

    if let Some(error) = data.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(message);
    }

    let delta = data
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(LineFrame { delta, done: false })
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn health_check(&self) -> bool {
        self.authorize(self.http_client.get(self.models_url()))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
        let response = self
            .authorize(self.http_client.post(self.completions_url()))
            .json(&Self::build_body(request))
            .send()
            .await?;
        let response = check_status(response).await?;

        tracing::debug!(model = %request.model, "OpenAI stream opened");
        Ok(spawn_line_reader("openai", response, parse_line))
    }
}
