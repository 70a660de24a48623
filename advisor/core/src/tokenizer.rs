//! Incremental Tokenizer
//!
//! Splits a growing text buffer into complete lexical tokens while holding
//! back the trailing fragment that may still grow when more text arrives.
//!
//! # Carry Contract
//!
//! ```text
//!   buffer:  "Hello, wor"          next delta: "ld! "
//!   emitted: ["Hello", ","]        carry + delta: "world! "
//!   carry:   "wor"                 emitted: ["world", "!"]   carry: ""
//! ```
//!
//! [`tokenize`] is pure; [`TokenStream`] threads the carry for a single
//! stream so callers only ever see each token once.

use std::sync::LazyLock;

use regex::Regex;

/// Word runs (letters of any script, digits, underscore) or a single
/// character that is neither whitespace nor a word character.
static WORD_OR_PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Alphabetic}\p{Nd}_]+|[^\s\p{Alphabetic}\p{Nd}_]")
        .expect("Invalid word/punctuation regex")
});

/// Maximal runs of non-whitespace.
static NON_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("Invalid non-whitespace regex"));

/// Result of tokenizing one buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokenized {
    /// Tokens that can no longer change
    pub emitted: Vec<String>,
    /// Trailing fragment withheld until more input arrives
    pub carry: String,
}

/// Tokenize `buffer`.
///
/// With `separate_punctuation`, punctuation characters become tokens of their
/// own; otherwise a token is any run of non-whitespace. If the buffer does not
/// end in whitespace, the last token is returned as `carry` instead of being
/// emitted.
#[must_use]
pub fn tokenize(buffer: &str, separate_punctuation: bool) -> Tokenized {
    let pattern = if separate_punctuation {
        &*WORD_OR_PUNCTUATION
    } else {
        &*NON_WHITESPACE
    };

    let mut emitted: Vec<String> = pattern
        .find_iter(buffer)
        .map(|m| m.as_str().to_string())
        .collect();

    let ends_in_whitespace = buffer.chars().last().map_or(true, char::is_whitespace);
    let carry = if ends_in_whitespace {
        String::new()
    } else {
        emitted.pop().unwrap_or_default()
    };

    Tokenized { emitted, carry }
}

/// Carry-threading tokenizer for one live stream
///
/// Owned by whichever component renders text token by token. Never shared
/// between streams.
#[derive(Clone, Debug, Default)]
pub struct TokenStream {
    carry: String,
    separate_punctuation: bool,
    emitted_count: usize,
}

impl TokenStream {
    /// Create a stream that folds punctuation into whitespace-delimited tokens
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream that emits punctuation characters as separate tokens
    #[must_use]
    pub fn with_punctuation() -> Self {
        Self {
            separate_punctuation: true,
            ..Self::default()
        }
    }

    /// Feed newly arrived text, returning the tokens that became stable
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(delta);

        let Tokenized { emitted, carry } = tokenize(&buffer, self.separate_punctuation);
        self.carry = carry;
        self.emitted_count += emitted.len();
        emitted
    }

    /// The fragment currently withheld
    #[must_use]
    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// Total tokens emitted so far
    #[must_use]
    pub fn emitted_count(&self) -> usize {
        self.emitted_count
    }

    /// End of input: the carry can no longer grow
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            None
        } else {
            self.emitted_count += 1;
            Some(std::mem::take(&mut self.carry))
        }
    }

    /// Drop the carry and start over (the source text was replaced)
    pub fn reset(&mut self) {
        self.carry.clear();
        self.emitted_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn test_trailing_word_is_carried() {
        let result = tokenize("Hello, world", true);
        assert_eq!(result.emitted, strings(&["Hello", ","]));
        assert_eq!(result.carry, "world");
    }

    #[test]
    fn test_trailing_whitespace_emits_everything() {
        let result = tokenize("Hello, world ", true);
        assert_eq!(result.emitted, strings(&["Hello", ",", "world"]));
        assert_eq!(result.carry, "");
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert_eq!(tokenize("", true), Tokenized::default());
        assert_eq!(tokenize("   \n\t", true), Tokenized::default());
        assert_eq!(tokenize("  ", false), Tokenized::default());
    }

    #[test]
    fn test_single_word_in_progress() {
        let result = tokenize("Budg", true);
        assert!(result.emitted.is_empty());
        assert_eq!(result.carry, "Budg");
    }

    #[test]
    fn test_punctuation_folded_without_separation() {
        let result = tokenize("Save 10%, then invest. ", false);
        assert_eq!(result.emitted, strings(&["Save", "10%,", "then", "invest."]));
        assert_eq!(result.carry, "");
    }

    #[test]
    fn test_accented_letters_stay_in_words() {
        let result = tokenize("Épargne à côté ", true);
        assert_eq!(result.emitted, strings(&["Épargne", "à", "côté"]));
    }

    #[test]
    fn test_underscore_and_digits_are_word_characters() {
        let result = tokenize("rate_2024 is 3.5 ", true);
        assert_eq!(result.emitted, strings(&["rate_2024", "is", "3", ".", "5"]));
    }

    #[test]
    fn test_trailing_punctuation_is_carried() {
        let result = tokenize("done!", true);
        assert_eq!(result.emitted, strings(&["done"]));
        assert_eq!(result.carry, "!");
    }

    #[test]
    fn test_token_stream_threads_carry() {
        let mut stream = TokenStream::with_punctuation();

        assert_eq!(stream.push("Hello, wor"), strings(&["Hello", ","]));
        assert_eq!(stream.carry(), "wor");
        assert_eq!(stream.push("ld! "), strings(&["world", "!"]));
        assert_eq!(stream.carry(), "");
        assert_eq!(stream.push("Bye"), Vec::<String>::new());
        assert_eq!(stream.finish(), Some("Bye".to_string()));
        assert_eq!(stream.finish(), None);
        assert_eq!(stream.emitted_count(), 5);
    }

    #[test]
    fn test_token_stream_split_on_whitespace_boundary() {
        let mut stream = TokenStream::new();

        assert_eq!(stream.push("ab"), Vec::<String>::new());
        assert_eq!(stream.push(" cd"), strings(&["ab"]));
        assert_eq!(stream.carry(), "cd");
    }

    #[test]
    fn test_token_stream_reset() {
        let mut stream = TokenStream::new();
        stream.push("one two");
        stream.reset();
        assert_eq!(stream.carry(), "");
        assert_eq!(stream.emitted_count(), 0);
    }
}
