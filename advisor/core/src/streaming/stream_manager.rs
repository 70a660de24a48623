//! Stream Manager Implementation
//!
//! Manages concurrent answer streams, one per session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::accumulator::{AnswerAccumulator, FinalOutcome};
use crate::answer::PartialAnswer;
use crate::backend::StreamingToken;
use crate::schema::Schema;
use crate::session::{SessionId, SessionOutcome, SessionState, SessionView, StreamSession};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the stream manager
#[derive(Clone, Debug)]
pub struct StreamManagerConfig {
    /// Maximum number of concurrent streams
    pub max_concurrent_streams: usize,
    /// Schema the final document is validated against
    pub schema: Schema,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 16,
            schema: Schema::answer(),
        }
    }
}

// ============================================================================
// Stream Events
// ============================================================================

/// An event from an answer stream
#[derive(Clone, Debug)]
pub struct StreamEvent {
    /// The session this event belongs to
    pub session_id: SessionId,
    /// The event kind
    pub kind: StreamEventKind,
    /// Timestamp when this event was created
    pub timestamp: Instant,
}

/// Kind of stream event
#[derive(Clone, Debug)]
pub enum StreamEventKind {
    /// A chunk produced a new snapshot
    Partial {
        /// The snapshot (replaces any earlier one)
        answer: PartialAnswer,
        /// Chunks received so far
        chunk_count: u32,
    },
    /// The stream ended; the session is terminal
    Completed {
        /// Last projection
        answer: PartialAnswer,
        /// How it ended
        outcome: SessionOutcome,
        /// Chunks received
        chunk_count: u32,
        /// Time from registration to completion
        duration: Duration,
    },
}

impl StreamEventKind {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

// ============================================================================
// Answer Stream
// ============================================================================

/// Statistics for an answer stream
#[derive(Clone, Debug)]
pub struct StreamStats {
    /// Chunks received
    pub chunks_received: u32,
    /// Snapshots published
    pub snapshots_published: u32,
    /// Chunks skipped as parse noise
    pub noise_chunks: u32,
    /// When streaming started
    pub started_at: Instant,
    /// Last chunk received timestamp
    pub last_chunk_at: Option<Instant>,
}

/// The stream for a single session
///
/// Owns the session, its accumulator, and the publisher renderers subscribe
/// to. Nothing here is shared with other sessions.
pub struct AnswerStream {
    session: StreamSession,
    receiver: mpsc::Receiver<StreamingToken>,
    accumulator: AnswerAccumulator,
    publisher: watch::Sender<SessionView>,
    stats: StreamStats,
}

impl AnswerStream {
    /// Wrap a receiving session and its token channel
    ///
    /// # Errors
    ///
    /// Fails unless the session is in [`SessionState::Receiving`].
    pub fn new(
        session: StreamSession,
        receiver: mpsc::Receiver<StreamingToken>,
        schema: Schema,
    ) -> Result<Self, StreamRegisterError> {
        if !session.is_receiving() {
            return Err(StreamRegisterError::NotReceiving(session.state()));
        }

        let (publisher, _) = watch::channel(session.view());
        Ok(Self {
            session,
            receiver,
            accumulator: AnswerAccumulator::with_schema(schema),
            publisher,
            stats: StreamStats {
                chunks_received: 0,
                snapshots_published: 0,
                noise_chunks: 0,
                started_at: Instant::now(),
                last_chunk_at: None,
            },
        })
    }

    /// Get the session ID
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    /// The session as it stands
    #[must_use]
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Check if the stream has completed
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.session.state().is_terminal()
    }

    /// Everything received so far
    #[must_use]
    pub fn text(&self) -> &str {
        self.accumulator.text()
    }

    /// Get stream statistics
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Subscribe to snapshots of this session
    ///
    /// The receiver keeps the final view after the stream is dropped.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.publisher.subscribe()
    }

    fn event(&self, kind: StreamEventKind) -> StreamEvent {
        StreamEvent {
            session_id: self.session.id().clone(),
            kind,
            timestamp: Instant::now(),
        }
    }

    fn publish_view(&self) {
        self.publisher.send_replace(self.session.view());
    }

    fn on_delta(&mut self, delta: &str) -> Option<StreamEvent> {
        self.stats.chunks_received += 1;
        self.stats.last_chunk_at = Some(Instant::now());
        self.session.record_chunk();

        let Some(answer) = self.accumulator.push_str(delta).cloned() else {
            self.stats.noise_chunks += 1;
            return None;
        };

        if let Err(e) = self.session.publish(answer.clone()) {
            tracing::debug!(session_id = %self.session.id(), error = %e, "Snapshot dropped");
            return None;
        }
        self.stats.snapshots_published += 1;
        self.publish_view();

        Some(self.event(StreamEventKind::Partial {
            answer,
            chunk_count: self.session.chunk_count(),
        }))
    }

    fn finish(&mut self, interruption: Option<String>) -> StreamEvent {
        let session_id = self.session.id().clone();
        let result = self.accumulator.finish();

        let outcome = match result.outcome {
            FinalOutcome::Validated(answer) => SessionOutcome::Validated { answer },
            FinalOutcome::Incomplete => {
                let reason = interruption
                    .unwrap_or_else(|| "stream ended before the answer was complete".to_string());
                tracing::warn!(%session_id, %reason, "Stream interrupted; keeping partial answer");
                SessionOutcome::Interrupted { reason }
            }
            FinalOutcome::Violation(violation) => {
                tracing::warn!(%session_id, error = %violation, "Final answer violates schema");
                SessionOutcome::SchemaViolation { violation }
            }
        };

        if let Err(e) = self.session.complete(result.answer.clone(), outcome.clone()) {
            tracing::debug!(%session_id, error = %e, "Session already finished");
        }
        self.publish_view();

        let duration = self.stats.started_at.elapsed();
        tracing::info!(
            %session_id,
            chunks = self.stats.chunks_received,
            noise = self.stats.noise_chunks,
            duration_ms = duration.as_millis() as u64,
            "Stream completed"
        );

        self.event(StreamEventKind::Completed {
            answer: result.answer,
            outcome,
            chunk_count: self.session.chunk_count(),
            duration,
        })
    }

    /// Handle one message; `None` means the sender went away
    fn handle(&mut self, message: Option<StreamingToken>, events: &mut Vec<StreamEvent>) {
        match message {
            Some(StreamingToken::Token(delta)) => events.extend(self.on_delta(&delta)),
            Some(StreamingToken::Complete) => events.push(self.finish(None)),
            Some(StreamingToken::Error(error)) => events.push(self.finish(Some(error))),
            None => events.push(self.finish(Some("stream disconnected unexpectedly".to_string()))),
        }
    }

    /// Poll the stream for new chunks (non-blocking)
    ///
    /// Every chunk that parses yields one `Partial` event, in arrival order.
    pub fn poll(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        while !self.is_completed() {
            match self.receiver.try_recv() {
                Ok(message) => self.handle(Some(message), &mut events),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.handle(None, &mut events),
            }
        }

        events
    }

    /// Wait for the next chunk, then drain whatever else is ready
    pub async fn next(&mut self) -> Vec<StreamEvent> {
        if self.is_completed() {
            return Vec::new();
        }

        let mut events = Vec::new();
        let message = self.receiver.recv().await;
        self.handle(message, &mut events);
        events.extend(self.poll());
        events
    }
}

// ============================================================================
// Stream Manager
// ============================================================================

/// Manages multiple concurrent answer streams
///
/// Completed streams are removed as soon as their terminal event is returned.
pub struct StreamManager {
    /// Active streams by session ID
    streams: HashMap<SessionId, AnswerStream>,
    /// Configuration
    config: StreamManagerConfig,
    /// Global statistics
    total_streams_created: u64,
    total_chunks_processed: u64,
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamManager {
    /// Create a new stream manager with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StreamManagerConfig::default())
    }

    /// Create a new stream manager with custom configuration
    #[must_use]
    pub fn with_config(config: StreamManagerConfig) -> Self {
        Self {
            streams: HashMap::new(),
            config,
            total_streams_created: 0,
            total_chunks_processed: 0,
        }
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &StreamManagerConfig {
        &self.config
    }

    /// Get the number of active streams
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.streams.len()
    }

    /// Whether another stream may be registered
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.streams.len() < self.config.max_concurrent_streams
    }

    /// Check if a session has an active stream
    #[must_use]
    pub fn has_stream(&self, session_id: &SessionId) -> bool {
        self.streams.contains_key(session_id)
    }

    /// Get a reference to a session's stream
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<&AnswerStream> {
        self.streams.get(session_id)
    }

    /// Register a receiving session
    ///
    /// Returns a receiver for the session's snapshots.
    ///
    /// # Errors
    ///
    /// Fails if the limit is reached, the session already has a stream, or
    /// the session is not receiving.
    pub fn register(
        &mut self,
        session: StreamSession,
        receiver: mpsc::Receiver<StreamingToken>,
    ) -> Result<watch::Receiver<SessionView>, StreamRegisterError> {
        if !self.has_capacity() {
            return Err(StreamRegisterError::MaxStreamsReached);
        }
        if self.streams.contains_key(session.id()) {
            return Err(StreamRegisterError::StreamAlreadyExists);
        }

        let stream = AnswerStream::new(session, receiver, self.config.schema.clone())?;
        let subscriber = stream.subscribe();
        tracing::debug!(session_id = %stream.session_id(), "Stream registered");

        self.streams.insert(stream.session_id().clone(), stream);
        self.total_streams_created += 1;

        Ok(subscriber)
    }

    /// Unregister a stream (cancels it)
    ///
    /// Dropping the stream drops its receiver, which stops the backend's
    /// reader task at its next send.
    pub fn unregister(&mut self, session_id: &SessionId) -> Option<AnswerStream> {
        let stream = self.streams.remove(session_id);
        if stream.is_some() {
            tracing::debug!(%session_id, "Stream cancelled");
        }
        stream
    }

    /// Subscribe to an active session's snapshots
    #[must_use]
    pub fn subscribe(&self, session_id: &SessionId) -> Option<watch::Receiver<SessionView>> {
        self.streams.get(session_id).map(AnswerStream::subscribe)
    }

    fn account(&mut self, events: &[StreamEvent]) {
        for event in events {
            match &event.kind {
                StreamEventKind::Partial { .. } => self.total_chunks_processed += 1,
                StreamEventKind::Completed { .. } => {}
            }
        }
    }

    /// Poll all active streams (non-blocking)
    ///
    /// Events of one session keep their order; sessions interleave by time.
    pub fn poll_all(&mut self) -> Vec<StreamEvent> {
        let mut all_events = Vec::new();

        for stream in self.streams.values_mut() {
            all_events.extend(stream.poll());
        }
        self.streams.retain(|_, stream| !stream.is_completed());
        self.account(&all_events);

        // Stable sort keeps per-session order for equal timestamps
        all_events.sort_by_key(|e| e.timestamp);
        all_events
    }

    /// Poll a specific session's stream
    pub fn poll_one(&mut self, session_id: &SessionId) -> Vec<StreamEvent> {
        let Some(stream) = self.streams.get_mut(session_id) else {
            return Vec::new();
        };

        let events = stream.poll();
        if stream.is_completed() {
            self.streams.remove(session_id);
        }
        self.account(&events);
        events
    }

    /// Wait for a specific session's next events
    ///
    /// Returns an empty list if the session has no active stream.
    pub async fn next_one(&mut self, session_id: &SessionId) -> Vec<StreamEvent> {
        let Some(stream) = self.streams.get_mut(session_id) else {
            return Vec::new();
        };

        let events = stream.next().await;
        if stream.is_completed() {
            self.streams.remove(session_id);
        }
        self.account(&events);
        events
    }

    /// Get IDs of all active streams
    #[must_use]
    pub fn active_stream_ids(&self) -> Vec<SessionId> {
        self.streams.keys().cloned().collect()
    }

    /// Get statistics for a specific stream
    #[must_use]
    pub fn stream_stats(&self, session_id: &SessionId) -> Option<&StreamStats> {
        self.streams.get(session_id).map(AnswerStream::stats)
    }

    /// Get total number of streams created (lifetime)
    #[must_use]
    pub fn total_streams_created(&self) -> u64 {
        self.total_streams_created
    }

    /// Get total chunks that produced a snapshot (lifetime)
    #[must_use]
    pub fn total_chunks_processed(&self) -> u64 {
        self.total_chunks_processed
    }

    /// Clear all streams (cancels any in-progress streams)
    pub fn clear(&mut self) {
        self.streams.clear();
    }

    /// Check if any streams are active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Error when registering a stream
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StreamRegisterError {
    /// Maximum concurrent streams reached
    #[error("maximum concurrent streams reached")]
    MaxStreamsReached,
    /// Session already has an active stream
    #[error("session already has an active stream")]
    StreamAlreadyExists,
    /// Only receiving sessions can be streamed
    #[error("session is {0:?}, not receiving")]
    NotReceiving(SessionState),
}

// ============================================================================
// Tests
// ============================================================================
