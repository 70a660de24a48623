//! LLM Backend Integration
//!
//! This module provides abstracted access to completion providers through a
//! common trait interface.
//!
//! # Available Backends
//!
//! - **Ollama**: Local LLM server (default)
//! - **OpenAI**: Any OpenAI-compatible `/chat/completions` server
//! - **ChatEndpoint**: Another advisor's `POST /chat`
//!
//! # Usage
//!
//! ```ignore
//! use advisor_core::backend::{self, BackendConfig, LlmRequest};
//!
//! let client = backend::build_client(Duration::from_secs(10), Duration::from_secs(60))?;
//! let backend = backend::from_config(&BackendConfig::default(), client)?;
//! let rx = backend.send_streaming(&LlmRequest::new("Hello!", "llama3.2")).await?;
//! ```
//!
//! Backends never retry. A failure before streaming is returned to the
//! caller; a failure afterwards arrives as [`StreamingToken::Error`].

mod chat_endpoint;
mod ollama;
mod openai;
mod reader;
mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use chat_endpoint::ChatEndpointBackend;
pub use ollama::OllamaBackend;
pub use openai::{OpenAiBackend, DEFAULT_BASE_URL as OPENAI_BASE_URL};
pub use traits::{BackendConfig, LlmBackend, LlmRequest, StreamingToken};

use crate::error::ProviderError;

/// Build the HTTP client shared by every backend
///
/// `read_timeout` bounds the gap between two body chunks rather than the whole
/// response, so long answers are not cut off.
///
/// # Errors
///
/// Fails if the TLS backend cannot be initialised.
pub fn build_client(
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .build()?)
}

/// Create the backend described by `config`
///
/// # Errors
///
/// Returns [`ProviderError::Config`] when the hosted OpenAI API is selected
/// without an API key.
pub fn from_config(
    config: &BackendConfig,
    http_client: reqwest::Client,
) -> Result<Arc<dyn LlmBackend>, ProviderError> {
    let backend: Arc<dyn LlmBackend> = match config {
        BackendConfig::Ollama { host, port } => {
            Arc::new(OllamaBackend::new(host.clone(), *port, http_client))
        }
        BackendConfig::OpenAi { api_key, base_url } => {
            if api_key.is_empty() && base_url.trim_end_matches('/') == OPENAI_BASE_URL {
                return Err(ProviderError::Config(
                    "OPENAI_API_KEY is required for api.openai.com".to_string(),
                ));
            }
            Arc::new(OpenAiBackend::new(api_key.clone(), base_url.clone(), http_client))
        }
        BackendConfig::ChatEndpoint { url } => {
            Arc::new(ChatEndpointBackend::new(url.clone(), http_client))
        }
    };

    tracing::debug!(backend = backend.name(), "Backend created");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_names() {
        let client = reqwest::Client::new();

        let backend = from_config(&BackendConfig::default(), client.clone()).unwrap();
        assert_eq!(backend.name(), "Ollama");

        let config = BackendConfig::OpenAi {
            api_key: String::new(),
            base_url: "http://localhost:1234/v1".to_string(),
        };
        assert_eq!(from_config(&config, client.clone()).unwrap().name(), "OpenAI");

        let config = BackendConfig::ChatEndpoint {
            url: "http://localhost:8787".to_string(),
        };
        assert_eq!(from_config(&config, client).unwrap().name(), "advisor-daemon");
    }

    #[test]
    fn test_hosted_openai_requires_key() {
        let config = BackendConfig::OpenAi {
            api_key: String::new(),
            base_url: OPENAI_BASE_URL.to_string(),
        };
        let err = from_config(&config, reqwest::Client::new()).err().unwrap();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(5), Duration::from_secs(30)).is_ok());
    }
}
