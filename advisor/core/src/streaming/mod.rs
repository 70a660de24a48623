//! Streaming Infrastructure for Concurrent Answers
//!
//! Each submitted prompt gets its own [`AnswerStream`]: the token receiver
//! from the backend, an accumulator, the session state, and a `watch`
//! publisher. The [`StreamManager`] polls every stream without letting one
//! session's chunks touch another's state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        StreamManager                          │
//! │   ┌──────────────────────┐   ┌──────────────────────┐         │
//! │   │ AnswerStream (id: A) │   │ AnswerStream (id: B) │  ...    │
//! │   │  mpsc ──▶ accumulator│   │  mpsc ──▶ accumulator│         │
//! │   │       ──▶ watch      │   │       ──▶ watch      │         │
//! │   └──────────┬───────────┘   └──────────┬───────────┘         │
//! │              └──────── poll_all() ──────┘                     │
//! │                            │                                  │
//! │                            ▼                                  │
//! │              StreamEvent { session_id, kind }                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Renderers either consume events or hold a `watch::Receiver<SessionView>`
//! per session. Every publication replaces the whole view.
//!
//! # Example
//!
//! ```ignore
//! use advisor_core::streaming::StreamManager;
//! use advisor_core::StreamSession;
//!
//! let mut manager = StreamManager::new();
//! let mut session = StreamSession::new("How do I start an emergency fund?");
//! session.submit()?;
//! let rx = backend.send_streaming(&request).await?;
//! session.start_receiving()?;
//! let view = manager.register(session, rx)?;
//!
//! for event in manager.poll_all() {
//!     println!("{}: {:?}", event.session_id, event.kind);
//! }
//! ```

mod stream_manager;

pub use stream_manager::{
    AnswerStream, StreamEvent, StreamEventKind, StreamManager, StreamManagerConfig,
    StreamRegisterError, StreamStats,
};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;
