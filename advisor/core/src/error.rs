//! Error Types
//!
//! Only [`RequestError`] reaches the user as a failure. Everything that goes
//! wrong after streaming has begun degrades to "show what was parsed" and is
//! reported through [`SessionOutcome`](crate::session::SessionOutcome).

use thiserror::Error;

use crate::session::InvalidTransition;
use crate::streaming::StreamRegisterError;

/// Failure talking to a completion provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status
    #[error("provider returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message extracted from the body
        message: String,
    },

    /// Network or protocol failure (connect, timeout, TLS, ...)
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend is misconfigured (e.g. missing credential)
    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    /// HTTP status, if the provider returned one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Config(_) => None,
        }
    }
}

/// A prompt could not be submitted; no partial state exists
#[derive(Debug, Error)]
pub enum RequestError {
    /// Prompt is empty or only whitespace
    #[error("prompt is empty")]
    EmptyPrompt,

    /// Prompt exceeds the configured limit
    #[error("prompt is {len} characters; the limit is {max}")]
    PromptTooLong {
        /// Prompt length in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// The provider call failed before any data arrived
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The stream could not be tracked
    #[error("cannot start stream: {0}")]
    Stream(#[from] StreamRegisterError),

    /// The session was not in a state that allows submission
    #[error(transparent)]
    Session(#[from] InvalidTransition),
}
