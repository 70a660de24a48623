//! Advisor - The Orchestration Core
//!
//! The Advisor turns prompts into answer streams. It:
//! - validates the prompt before any network call
//! - builds the schema-constrained request for the injected backend
//! - registers the resulting stream with the [`StreamManager`]
//! - lets renderers subscribe to each session's snapshots
//!
//! The Advisor is UI-agnostic: the daemon, the CLI and the tests all drive it
//! the same way. The backend is injected, so tests substitute a scripted one.

use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::{LlmBackend, LlmRequest};
use crate::error::RequestError;
use crate::schema::Schema;
use crate::session::{SessionId, SessionView, StreamSession};
use crate::streaming::{StreamEvent, StreamManager, StreamManagerConfig, StreamRegisterError};

/// Advisor configuration
#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    /// Model to use
    pub model: String,
    /// System prompt
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token limit (0 = provider default)
    pub max_tokens: u32,
    /// Maximum prompt length in characters
    pub max_prompt_length: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            system_prompt: None,
            temperature: 0.3,
            max_tokens: 0,
            max_prompt_length: 4000,
        }
    }
}

impl AdvisorConfig {
    /// The schema-constrained provider request for `prompt`
    #[must_use]
    pub fn request(&self, prompt: &str, schema: &Schema) -> LlmRequest {
        let mut request = LlmRequest::new(prompt, self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_schema(schema.clone());
        if let Some(ref system) = self.system_prompt {
            request = request.with_system(system.clone());
        }
        request
    }
}

/// Check a prompt before submission
///
/// Returns the prompt with surrounding whitespace removed.
///
/// # Errors
///
/// [`RequestError::EmptyPrompt`] or [`RequestError::PromptTooLong`].
pub fn check_prompt(prompt: &str, max_len: usize) -> Result<&str, RequestError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(RequestError::EmptyPrompt);
    }

    let len = prompt.chars().count();
    if len > max_len {
        return Err(RequestError::PromptTooLong { len, max: max_len });
    }
    Ok(prompt)
}

/// The orchestrator
pub struct Advisor {
    backend: Arc<dyn LlmBackend>,
    config: AdvisorConfig,
    schema: Schema,
    streams: StreamManager,
}

impl Advisor {
    /// Create an advisor with default stream settings
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, config: AdvisorConfig) -> Self {
        Self::with_stream_config(backend, config, StreamManagerConfig::default())
    }

    /// Create an advisor with custom stream settings
    #[must_use]
    pub fn with_stream_config(
        backend: Arc<dyn LlmBackend>,
        config: AdvisorConfig,
        stream_config: StreamManagerConfig,
    ) -> Self {
        Self {
            backend,
            config,
            schema: stream_config.schema.clone(),
            streams: StreamManager::with_config(stream_config),
        }
    }

    /// Name of the backend in use
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The backend in use
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Build the provider request for a checked prompt
    #[must_use]
    pub fn build_request(&self, prompt: &str) -> LlmRequest {
        self.config.request(prompt, &self.schema)
    }

    async fn start(
        &mut self,
        prompt: &str,
    ) -> Result<(SessionId, watch::Receiver<SessionView>), RequestError> {
        let prompt = check_prompt(prompt, self.config.max_prompt_length)?;
        if !self.streams.has_capacity() {
            return Err(StreamRegisterError::MaxStreamsReached.into());
        }

        let mut session = StreamSession::new(prompt);
        let session_id = session.id().clone();
        session.submit()?;

        let request = self.build_request(prompt);
        let receiver = match self.backend.send_streaming(&request).await {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::warn!(
                    %session_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Request failed before streaming"
                );
                session.fail(e.to_string())?;
                return Err(e.into());
            }
        };

        session.start_receiving()?;
        let view = self.streams.register(session, receiver)?;
        tracing::info!(%session_id, backend = self.backend.name(), model = %self.config.model, "Streaming started");

        Ok((session_id, view))
    }

    /// Submit a prompt and start streaming its answer
    ///
    /// On success the session is receiving; drive it with
    /// [`poll_streaming`](Self::poll_streaming) or
    /// [`next_events`](Self::next_events).
    ///
    /// # Errors
    ///
    /// [`RequestError`] if the prompt is rejected or the provider fails before
    /// streaming. No session state survives a failed submission.
    pub async fn submit(&mut self, prompt: &str) -> Result<SessionId, RequestError> {
        self.start(prompt).await.map(|(id, _)| id)
    }

    /// Subscribe to an active session's snapshots
    #[must_use]
    pub fn subscribe(&self, session_id: &SessionId) -> Option<watch::Receiver<SessionView>> {
        self.streams.subscribe(session_id)
    }

    /// Process whatever has arrived on every stream (non-blocking)
    pub fn poll_streaming(&mut self) -> Vec<StreamEvent> {
        self.streams.poll_all()
    }

    /// Wait for the next events of one session
    pub async fn next_events(&mut self, session_id: &SessionId) -> Vec<StreamEvent> {
        self.streams.next_one(session_id).await
    }

    /// Whether a session is still streaming
    #[must_use]
    pub fn is_active(&self, session_id: &SessionId) -> bool {
        self.streams.has_stream(session_id)
    }

    /// IDs of all sessions still streaming
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.streams.active_stream_ids()
    }

    /// Abandon a session
    ///
    /// The backend stops reading at its next chunk. Returns `false` if the
    /// session was not streaming.
    pub fn cancel(&mut self, session_id: &SessionId) -> bool {
        self.streams.unregister(session_id).is_some()
    }

    /// Submit a prompt and drive it to its terminal state
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub async fn ask(&mut self, prompt: &str) -> Result<SessionView, RequestError> {
        let (session_id, view) = self.start(prompt).await?;
        while self.streams.has_stream(&session_id) {
            self.streams.next_one(&session_id).await;
        }
        let last = view.borrow().clone();
        Ok(last)
    }
}
