//! Chunk Decoding
//!
//! Network chunks arrive on arbitrary byte boundaries. [`Utf8Decoder`] holds
//! back a multi-byte sequence split across chunks, and [`LineBuffer`]
//! reassembles newline-delimited frames (SSE `data:` lines, NDJSON) split the
//! same way.

/// Incremental UTF-8 decoder
#[derive(Clone, Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, keeping an incomplete trailing sequence for the next call
    ///
    /// Invalid sequences are replaced with U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Whether bytes are being held back
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// End of input: flush whatever is held back (lossily)
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Reassembles newline-terminated lines across chunks
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    decoder: Utf8Decoder,
    partial: String,
}

impl LineBuffer {
    /// Create an empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by them (without `\r\n`)
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(bytes);
        self.partial.push_str(&text);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let line = self.partial[..pos].trim_end_matches('\r').to_string();
            self.partial.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// End of input: the unterminated last line, if any
    pub fn finish(&mut self) -> Option<String> {
        if let Some(rest) = self.decoder.finish() {
            self.partial.push_str(&rest);
        }
        let line = std::mem::take(&mut self.partial);
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_passes_ascii_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"{\"title\":"), "{\"title\":");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decoder_holds_split_sequence() {
        let bytes = "épargne".as_bytes();
        let mut decoder = Utf8Decoder::new();

        // 'é' is two bytes; split between them
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..]), "épargne");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), Some("\u{FFFD}".to_string()));
    }

    #[test]
    fn test_line_buffer_reassembles_lines() {
        let mut lines = LineBuffer::new();
        assert!(lines.push(b"data: {\"a\"").is_empty());
        assert_eq!(lines.push(b":1}\r\ndata: [DO"), vec!["data: {\"a\":1}"]);
        assert_eq!(lines.push(b"NE]\n\n"), vec!["data: [DONE]", ""]);
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_line_buffer_finish_returns_unterminated_line() {
        let mut lines = LineBuffer::new();
        lines.push(b"{\"done\":true}");
        assert_eq!(lines.finish(), Some("{\"done\":true}".to_string()));
    }
}
