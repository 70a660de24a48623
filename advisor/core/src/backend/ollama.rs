//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions; `format` takes a JSON schema
//! - `/api/tags` - List available models (used as the health probe)
//!
//! The streaming response is newline-delimited JSON. Each line carries a
//! `response` delta; the last one has `done: true`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::reader::{check_status, spawn_line_reader, LineFrame};
use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use crate::error::ProviderError;

/// Ollama backend client
#[derive(Clone)]
pub struct OllamaBackend {
    /// Host address
    host: String,
    /// Port number
    port: u16,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend sharing `http_client`
    pub fn new(host: impl Into<String>, port: u16, http_client: reqwest::Client) -> Self {
        Self {
            host: host.into(),
            port,
            http_client,
        }
    }


    /// Get the base URL
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Build the request body
    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": true,
            "options": { "temperature": request.temperature },
        });

        if let Some(ref system) = request.system {
            body["system"] = json!(system);
        }
        if request.max_tokens > 0 {
            body["options"]["num_predict"] = json!(request.max_tokens);
        }
        if let Some(ref schema) = request.schema {
            body["format"] = schema.to_json_schema();
        }

        body
    }
}

/// Parse one NDJSON line of a generate stream
fn parse_line(line: &str) -> Result<LineFrame, String> {
    let data: Value = match serde_json::from_str(line) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed Ollama line");
            return Ok(LineFrame::skip());
        }
    };

    if let Some(error) = data.get("error").and_then(Value::as_str) {
        return Err(error.to_string());
    }

    Ok(LineFrame {
        delta: data.get("response").and_then(Value::as_str).map(str::to_string),
        done: data.get("done").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
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
            .http_client
            .post(self.generate_url())
            .json(&Self::build_body(request))
            .send()
            .await?;
        let response = check_status(response).await?;

        tracing::debug!(model = %request.model, "Ollama stream opened");
        Ok(spawn_line_reader("ollama", response, parse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn test_ollama_backend_creation() {
        let backend = OllamaBackend::new("localhost", 11434, reqwest::Client::new());
        assert_eq!(backend.host, "localhost");
        assert_eq!(backend.port, 11434);
        assert_eq!(backend.base_url(), "http://localhost:11434");
        assert_eq!(backend.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_build_body() {
        let request = LlmRequest::new("Hello", "llama3.2").with_system("Be helpful");
        let body = OllamaBackend::build_body(&request);
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["system"], "Be helpful");
        assert_eq!(body["stream"], true);
        assert!(body.get("format").is_none());
        assert!(body["options"].get("num_predict").is_none());

        let request = request.with_max_tokens(256).with_schema(Schema::answer());
        let body = OllamaBackend::build_body(&request);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["format"]["type"], "object");
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line(r#"{"response":"{\"ti","done":false}"#),
            Ok(LineFrame::delta(r#"{"ti"#))
        );
        assert_eq!(
            parse_line(r#"{"response":"","done":true,"eval_count":12}"#),
            Ok(LineFrame {
                delta: Some(String::new()),
                done: true,
            })
        );
        assert_eq!(parse_line("not json"), Ok(LineFrame::skip()));
        assert_eq!(
            parse_line(r#"{"error":"model not found"}"#),
            Err("model not found".to_string())
        );
    }
}
