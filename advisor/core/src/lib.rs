//! Advisor Core - Streaming Structured Financial Advice
//!
//! This crate turns a token-by-token completion stream into a progressively
//! updated, schema-validated answer. It has no UI dependencies: the daemon,
//! the terminal client and the tests all drive the same [`Advisor`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   deltas   ┌───────────────────────────────────────┐
//! │  LlmBackend  │ ─────────▶ │             AnswerStream              │
//! │ Ollama/OpenAI│   (mpsc)   │  accumulator ─▶ lenient parse ─▶      │
//! │ /chat client │            │  PartialAnswer ─▶ watch<SessionView>  │
//! └──────────────┘            └───────────────────┬───────────────────┘
//!                                                 │ one per session
//!                                       ┌─────────┴─────────┐
//!                                       │   StreamManager   │
//!                                       └─────────┬─────────┘
//!                                                 │
//!                                       ┌─────────┴─────────┐
//!                                       │      Advisor      │
//!                                       └───────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Advisor`]: submits prompts and drives sessions
//! - [`PartialAnswer`]: best projection of the document so far, replaced per chunk
//! - [`Answer`]: the validated final answer
//! - [`Schema`]: the answer shape, sent to providers and used for validation
//! - [`TokenStream`]: word-boundary tokenizer for live text rendering
//!
//! # Quick Start
//!
//! ```ignore
//! use advisor_core::{backend, load_config, Advisor};
//!
//! let config = load_config()?;
//! let client = backend::build_client(config.connect_timeout, config.read_timeout)?;
//! let backend = backend::from_config(&config.backend_config(), client)?;
//! let mut advisor = Advisor::new(backend, config.advisor_config());
//!
//! let view = advisor.ask("How do I build an emergency fund?").await?;
//! println!("{:?}", view.answer);
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: provider abstraction (Ollama, OpenAI-compatible, daemon client)
//! - [`codec`]: UTF-8 and line reassembly across network chunks
//! - [`tokenizer`]: incremental tokenizer with carry
//! - [`partial_json`]: lenient parser for truncated JSON
//! - [`schema`]: answer schema and validation
//! - [`answer`]: partial and validated answer types
//! - [`accumulator`]: per-stream text buffer and projection
//! - [`session`]: session lifecycle
//! - [`streaming`]: concurrent stream management
//! - [`advisor`]: the orchestrator
//! - [`config`]: TOML/env/CLI configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accumulator;
pub mod advisor;
pub mod answer;
pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod partial_json;
pub mod schema;
pub mod session;
pub mod streaming;
pub mod tokenizer;

// Re-exports for convenience
pub use accumulator::{AccumulatorStats, AnswerAccumulator, FinalAnswer, FinalOutcome};
pub use advisor::{check_prompt, Advisor, AdvisorConfig};
pub use answer::{Answer, PartialAnswer, PartialStep, PartialStrategy, Step, Strategy};
pub use backend::{BackendConfig, LlmBackend, LlmRequest, StreamingToken};
pub use error::{ProviderError, RequestError};
pub use partial_json::parse_partial;
pub use schema::{FieldSpec, FieldType, Schema, SchemaViolation, Violation, ViolationKind};
pub use session::{
    InvalidTransition, SessionId, SessionOutcome, SessionState, SessionView, StreamSession,
};
pub use tokenizer::{tokenize, TokenStream, Tokenized};

// Streaming exports
pub use streaming::{
    AnswerStream, StreamEvent, StreamEventKind, StreamManager, StreamManagerConfig,
    StreamRegisterError, StreamStats,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, AdvisorConfigFile, AdvisorToml,
    ConfigError, ConfigOverrides, ConfigSource, ProviderKind,
};
