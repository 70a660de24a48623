//! Stream Sessions
//!
//! A [`StreamSession`] tracks one prompt-to-answer exchange.
//!
//! ```text
//! Idle ──submit──▶ Submitting ──start_receiving──▶ Receiving ──complete──▶ Completed
//!   │                  │                            │  ▲
//!   └──────fail────────┴────────────fail────────────┘  └─ publish (per chunk)
//!                                                     ▼
//!                                                   Failed
//! ```
//!
//! `Completed` and `Failed` are terminal. An interrupted stream still ends in
//! `Completed`; only a request that never started streaming ends in `Failed`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answer::{Answer, PartialAnswer};
use crate::schema::SchemaViolation;

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    ///
    /// Uses an atomic counter combined with timestamp to ensure uniqueness
    /// even when multiple sessions are created in the same millisecond.
    #[must_use]
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("session_{}_{count}", now_ms()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet sent
    Idle,
    /// Waiting for the provider to accept the request
    Submitting,
    /// Chunks are arriving
    Receiving,
    /// Stream ended (possibly degraded)
    Completed,
    /// The request failed before streaming
    Failed,
}

impl SessionState {
    /// No transition leaves a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The complete document conforms to the schema
    Validated {
        /// The validated answer
        answer: Answer,
    },
    /// The stream closed before the document was complete
    Interrupted {
        /// Why the stream ended
        reason: String,
    },
    /// The document is complete JSON but fails the schema
    SchemaViolation {
        /// The violations
        violation: SchemaViolation,
    },
    /// The request failed before any data arrived
    Failed {
        /// User-visible error
        error: String,
    },
}

impl SessionOutcome {
    /// Whether the renderer should show this as "done" (possibly degraded)
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// An illegal lifecycle transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("invalid session transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// State before
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// Snapshot published to renderers
///
/// Always replaced whole; never observed half-updated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionView {
    /// Session identifier
    pub id: SessionId,
    /// Lifecycle state
    pub state: SessionState,
    /// Latest projection, if any chunk has parsed
    pub answer: Option<PartialAnswer>,
    /// Terminal outcome
    pub outcome: Option<SessionOutcome>,
    /// Chunks received so far
    pub chunk_count: u32,
}

/// One prompt-to-answer exchange
#[derive(Clone, Debug)]
pub struct StreamSession {
    id: SessionId,
    prompt: String,
    state: SessionState,
    answer: Option<PartialAnswer>,
    outcome: Option<SessionOutcome>,
    chunk_count: u32,
    created_at: u64,
    updated_at: u64,
}

impl StreamSession {
    /// Create an idle session for `prompt`
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::with_id(SessionId::new(), prompt)
    }

    /// Create an idle session with a specific ID
    pub fn with_id(id: SessionId, prompt: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id,
            prompt: prompt.into(),
            state: SessionState::Idle,
            answer: None,
            outcome: None,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The submitted prompt
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether chunks are still expected
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.state == SessionState::Receiving
    }

    /// Latest published projection
    #[must_use]
    pub fn answer(&self) -> Option<&PartialAnswer> {
        self.answer.as_ref()
    }

    /// Terminal outcome, once reached
    #[must_use]
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Chunks received
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Creation time (Unix ms)
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last mutation time (Unix ms)
    #[must_use]
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    fn transition(&mut self, allowed: &[SessionState], to: SessionState) -> Result<(), InvalidTransition> {
        if !allowed.contains(&self.state) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = now_ms();
        Ok(())
    }

    /// `Idle → Submitting`
    ///
    /// # Errors
    ///
    /// Fails if the session is not idle.
    pub fn submit(&mut self) -> Result<(), InvalidTransition> {
        self.transition(&[SessionState::Idle], SessionState::Submitting)
    }

    /// `Submitting → Receiving`
    ///
    /// # Errors
    ///
    /// Fails if the session is not submitting.
    pub fn start_receiving(&mut self) -> Result<(), InvalidTransition> {
        self.transition(&[SessionState::Submitting], SessionState::Receiving)
    }

    /// Record a chunk that produced no new answer
    pub fn record_chunk(&mut self) {
        if self.is_receiving() {
            self.chunk_count += 1;
            self.updated_at = now_ms();
        }
    }

    /// Replace the answer with a new snapshot (`Receiving → Receiving`)
    ///
    /// # Errors
    ///
    /// Fails unless the session is receiving.
    pub fn publish(&mut self, answer: PartialAnswer) -> Result<(), InvalidTransition> {
        self.transition(&[SessionState::Receiving], SessionState::Receiving)?;
        self.answer = Some(answer);
        Ok(())
    }

    /// `Receiving → Completed`
    ///
    /// `answer` is the last projection; it is kept even when the outcome is
    /// degraded.
    ///
    /// # Errors
    ///
    /// Fails unless the session is receiving.
    pub fn complete(
        &mut self,
        answer: PartialAnswer,
        outcome: SessionOutcome,
    ) -> Result<(), InvalidTransition> {
        self.transition(&[SessionState::Receiving], SessionState::Completed)?;
        self.answer = Some(answer);
        self.outcome = Some(outcome);
        Ok(())
    }

    /// `Idle | Submitting → Failed`
    ///
    /// # Errors
    ///
    /// Fails once streaming has begun; interrupted streams complete instead.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(&[SessionState::Idle, SessionState::Submitting], SessionState::Failed)?;
        self.outcome = Some(SessionOutcome::Failed {
            error: error.into(),
        });
        Ok(())
    }

    /// Snapshot for renderers
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            state: self.state,
            answer: self.answer.clone(),
            outcome: self.outcome.clone(),
            chunk_count: self.chunk_count,
        }
    }
}

/// Get current time in milliseconds
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
