//! Client for an advisor daemon's `POST /chat`
//!
//! The daemon already talks to the provider and streams the raw deltas back
//! as a chunked `text/plain` body, so every decoded chunk is forwarded as is.
//! Model, system prompt and schema are chosen by the daemon; only the prompt
//! is sent.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use super::reader::{check_status, spawn_text_reader};
use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use crate::error::ProviderError;

/// Backend speaking to another advisor over HTTP
#[derive(Clone)]
pub struct ChatEndpointBackend {
    base_url: String,
    http_client: reqwest::Client,
}

impl ChatEndpointBackend {
    /// Create a client for the daemon at `base_url`
    pub fn new(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }


    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

#[async_trait]
impl LlmBackend for ChatEndpointBackend {
    fn name(&self) -> &'static str {
        "advisor-daemon"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.health_url())
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
            .post(self.chat_url())
            .json(&json!({ "prompt": request.prompt }))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(spawn_text_reader("chat", response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let backend = ChatEndpointBackend::new("http://127.0.0.1:8787/", reqwest::Client::new());
        assert_eq!(backend.chat_url(), "http://127.0.0.1:8787/chat");
        assert_eq!(backend.health_url(), "http://127.0.0.1:8787/health");
    }
}
