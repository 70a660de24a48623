//! LLM Backend Traits
//!
//! Trait definitions for completion providers. The advisor streams from any
//! [`LlmBackend`] without knowing its wire protocol: every backend reduces its
//! provider's framing to a channel of incremental text deltas.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::schema::Schema;

/// Stream events from LLM backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// An incremental text delta (never cumulative text)
    Token(String),
    /// The provider finished the response
    Complete,
    /// The stream failed after it started
    Error(String),
}

/// Configuration for LLM requests
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The prompt to send
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Maximum tokens in response (0 = provider default)
    pub max_tokens: u32,
    /// Temperature (0.0-2.0)
    pub temperature: f32,
    /// System prompt
    pub system: Option<String>,
    /// Output schema the provider should constrain its response to
    pub schema: Option<Schema>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            max_tokens: 0,
            temperature: 0.7,
            system: None,
            schema: None,
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Constrain output to a schema
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// LLM Backend trait
///
/// Implement this trait to add support for a completion provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama", "OpenAI")
    fn name(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Send a request and get a streaming response
    ///
    /// Resolves once the provider has accepted the request (status and
    /// headers received). The returned receiver yields deltas in arrival
    /// order and ends with [`StreamingToken::Complete`] or
    /// [`StreamingToken::Error`]. Dropping the receiver stops the reader.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the request fails before streaming begins.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError>;
}

/// Backend connection configuration
#[derive(Clone, Debug, PartialEq)]
pub enum BackendConfig {
    /// Direct Ollama connection
    Ollama {
        /// Ollama host address
        host: String,
        /// Ollama port number
        port: u16,
    },
    /// OpenAI-compatible API
    OpenAi {
        /// API key for authentication (may be empty for local servers)
        api_key: String,
        /// Base URL, e.g. `https://api.openai.com/v1`
        base_url: String,
    },
    /// An advisor daemon's `POST /chat` endpoint
    ChatEndpoint {
        /// Daemon base URL, e.g. `http://127.0.0.1:8787`
        url: String,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Ollama {
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

impl BackendConfig {
    /// Create Ollama configuration
    pub fn ollama(host: impl Into<String>, port: u16) -> Self {
        Self::Ollama {
            host: host.into(),
            port,
        }
    }

    /// Short provider name, as used in config files
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ollama { .. } => "ollama",
            Self::OpenAi { .. } => "openai",
            Self::ChatEndpoint { .. } => "chat",
        }
    }
}
