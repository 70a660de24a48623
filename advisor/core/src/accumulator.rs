//! Partial-JSON Accumulator
//!
//! Collects decoded text for one stream, re-parses the whole buffer after
//! every chunk with [`parse_partial`], and projects the result onto
//! [`PartialAnswer`]. The buffer only grows.
//!
//! A chunk whose parse yields nothing usable (parse noise) leaves the previous
//! answer in place and is reported as `None` so the caller skips publication.

use serde_json::Value;

use crate::answer::{Answer, PartialAnswer};
use crate::codec::Utf8Decoder;
use crate::partial_json::parse_partial;
use crate::schema::{Schema, SchemaViolation};

/// Counters for one accumulator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Chunks appended
    pub chunks: u32,
    /// Chunks whose parse produced a new answer
    pub parsed: u32,
    /// Chunks skipped as parse noise
    pub noise: u32,
}

/// How the final document fared
#[derive(Clone, Debug, PartialEq)]
pub enum FinalOutcome {
    /// Complete and conforming
    Validated(Answer),
    /// The text never became a complete JSON document
    Incomplete,
    /// Complete JSON that does not conform to the schema
    Violation(SchemaViolation),
}

/// Result of [`AnswerAccumulator::finish`]
#[derive(Clone, Debug, PartialEq)]
pub struct FinalAnswer {
    /// Last successful projection (possibly empty)
    pub answer: PartialAnswer,
    /// Validation result
    pub outcome: FinalOutcome,
}

/// Accumulates one stream's text and tracks its best projection
#[derive(Debug)]
pub struct AnswerAccumulator {
    schema: Schema,
    decoder: Utf8Decoder,
    buffer: String,
    latest: PartialAnswer,
    stats: AccumulatorStats,
}

impl Default for AnswerAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerAccumulator {
    /// Accumulator validating against [`Schema::answer`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(Schema::answer())
    }

    /// Accumulator validating against a custom schema
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            decoder: Utf8Decoder::new(),
            buffer: String::new(),
            latest: PartialAnswer::default(),
            stats: AccumulatorStats::default(),
        }
    }

    /// Append raw bytes from the network
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Option<&PartialAnswer> {
        let text = self.decoder.decode(bytes);
        self.push_str(&text)
    }

    /// Append a decoded text delta and re-parse
    ///
    /// Returns the new snapshot, or `None` if this chunk was parse noise.
    pub fn push_str(&mut self, delta: &str) -> Option<&PartialAnswer> {
        self.buffer.push_str(delta);
        self.stats.chunks += 1;
        self.reparse()
    }

    fn reparse(&mut self) -> Option<&PartialAnswer> {
        match parse_partial(&self.buffer).as_ref().and_then(PartialAnswer::project) {
            Some(answer) => {
                self.stats.parsed += 1;
                self.latest = answer;
                Some(&self.latest)
            }
            None => {
                self.stats.noise += 1;
                tracing::debug!(
                    buffered = self.buffer.len(),
                    chunk = self.stats.chunks,
                    "Chunk produced no usable parse; keeping previous answer"
                );
                None
            }
        }
    }

    /// The current best projection
    #[must_use]
    pub fn current(&self) -> &PartialAnswer {
        &self.latest
    }

    /// Everything received so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> AccumulatorStats {
        self.stats
    }

    /// End of stream: final parse attempt and validation
    ///
    /// Only a strictly complete document is validated. A document that never
    /// completed keeps its last projection and reports
    /// [`FinalOutcome::Incomplete`].
    pub fn finish(&mut self) -> FinalAnswer {
        if let Some(rest) = self.decoder.finish() {
            self.buffer.push_str(&rest);
            let _ = self.reparse();
        }

        let outcome = match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => match Answer::validate(&self.schema, &value) {
                Ok(answer) => FinalOutcome::Validated(answer),
                Err(violation) => FinalOutcome::Violation(violation),
            },
            Err(_) => FinalOutcome::Incomplete,
        };

        FinalAnswer {
            answer: self.latest.clone(),
            outcome,
        }
    }
}
