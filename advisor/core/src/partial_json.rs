//! Lenient JSON Parsing
//!
//! Parses a JSON document that may have been cut off anywhere. The text is
//! first tried as-is; if that fails it is repaired and tried again.
//!
//! # Repair Rules
//!
//! The repair scans the text once, tracking open containers and the scalar in
//! progress at the end of input, then:
//!
//! - an open value string is kept and closed (`"Sav` becomes `"Sav"`), minus
//!   any unfinished escape sequence or unpaired high surrogate at its end
//! - an open object key, a key without a value, a trailing comma, an
//!   unterminated number or a partial `true`/`false`/`null` is cut back to
//!   the end of the last complete member of the innermost container
//! - open containers are closed innermost-first
//!
//! Numbers are cut rather than kept because a number at the end of input may
//! still gain digits; a kept prefix would contradict the final document.
//!
//! The result is deterministic for a given input.

use serde_json::Value;

/// Parse `text` leniently.
///
/// Returns `None` if the text is empty, is not a prefix of any JSON document,
/// or contains nothing that survives repair.
#[must_use]
pub fn parse_partial(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let repaired = repair(text)?;
    serde_json::from_str(&repaired).ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn closer(self) -> char {
        match self {
            Self::Object => '}',
            Self::Array => ']',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    /// Just opened: first key/value or the closing bracket
    Open,
    /// After a comma in an object
    Key,
    /// After a key
    Colon,
    /// After a colon, or after a comma in an array
    Value,
    /// After a complete member
    CommaOrClose,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    container: Container,
    expect: Expect,
    /// Byte offset just past the last complete member (or the opening bracket)
    clean_end: usize,
}

#[derive(Clone, Copy, Debug)]
enum Escape {
    None,
    Backslash { start: usize },
    Unicode { start: usize, digits: u8, value: u32 },
}

#[derive(Clone, Copy, Debug)]
struct StringScan {
    is_key: bool,
    escape: Escape,
    /// Start of a `\uD800`-`\uDBFF` escape still waiting for its low half
    high_surrogate: Option<usize>,
}

impl StringScan {
    fn new(is_key: bool) -> Self {
        Self {
            is_key,
            escape: Escape::None,
            high_surrogate: None,
        }
    }

    /// Advance over one character; returns true when the string closes
    fn step(&mut self, idx: usize, ch: char) -> bool {
        match self.escape {
            Escape::Backslash { start } => {
                if ch == 'u' {
                    self.escape = Escape::Unicode {
                        start,
                        digits: 0,
                        value: 0,
                    };
                } else {
                    self.escape = Escape::None;
                    self.high_surrogate = None;
                }
                false
            }
            Escape::Unicode {
                start,
                digits,
                value,
            } => {
                match ch.to_digit(16) {
                    Some(d) if digits < 3 => {
                        self.escape = Escape::Unicode {
                            start,
                            digits: digits + 1,
                            value: value * 16 + d,
                        };
                    }
                    Some(d) => {
                        let code = value * 16 + d;
                        self.escape = Escape::None;
                        self.high_surrogate = (0xD800..0xDC00).contains(&code).then_some(start);
                    }
                    // Malformed escape; the strict parse rejects it later
                    None => self.escape = Escape::None,
                }
                false
            }
            Escape::None => match ch {
                '"' => true,
                '\\' => {
                    self.escape = Escape::Backslash { start: idx };
                    false
                }
                _ => {
                    self.high_surrogate = None;
                    false
                }
            },
        }
    }

    /// Where to cut an unterminated string so that closing it is valid
    fn safe_end(&self, text_len: usize) -> usize {
        let end = match self.escape {
            Escape::None => text_len,
            Escape::Backslash { start } | Escape::Unicode { start, .. } => start,
        };
        self.high_surrogate.map_or(end, |start| start.min(end))
    }
}

#[derive(Clone, Copy, Debug)]
enum Scalar {
    None,
    String(StringScan),
    Number,
    Literal { start: usize },
}

fn is_number_char(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E')
}

fn is_complete_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "null")
}

struct Scanner {
    stack: Vec<Frame>,
    root_done: bool,
}

impl Scanner {
    /// A value may start here
    fn can_start_value(&self) -> bool {
        match self.stack.last() {
            None => !self.root_done,
            Some(frame) => match frame.container {
                Container::Object => frame.expect == Expect::Value,
                Container::Array => matches!(frame.expect, Expect::Open | Expect::Value),
            },
        }
    }

    /// A key string may start here
    fn can_start_key(&self) -> bool {
        self.stack.last().is_some_and(|frame| {
            frame.container == Container::Object && matches!(frame.expect, Expect::Open | Expect::Key)
        })
    }

    /// A value ending at byte offset `end` just completed
    fn value_done(&mut self, end: usize) {
        match self.stack.last_mut() {
            Some(frame) => {
                frame.expect = Expect::CommaOrClose;
                frame.clean_end = end;
            }
            None => self.root_done = true,
        }
    }

    fn key_done(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.expect = Expect::Colon;
        }
    }

    /// Handle a structural or value-starting character
    fn structural(&mut self, idx: usize, ch: char) -> Option<Scalar> {
        match ch {
            '{' | '[' => {
                if !self.can_start_value() {
                    return None;
                }
                let container = if ch == '{' {
                    Container::Object
                } else {
                    Container::Array
                };
                self.stack.push(Frame {
                    container,
                    expect: Expect::Open,
                    clean_end: idx + 1,
                });
                Some(Scalar::None)
            }
            '}' | ']' => {
                let frame = self.stack.pop()?;
                if frame.container.closer() != ch
                    || !matches!(frame.expect, Expect::Open | Expect::CommaOrClose)
                {
                    return None;
                }
                self.value_done(idx + 1);
                Some(Scalar::None)
            }
            ':' => {
                let frame = self.stack.last_mut()?;
                if frame.expect != Expect::Colon {
                    return None;
                }
                frame.expect = Expect::Value;
                Some(Scalar::None)
            }
            ',' => {
                let frame = self.stack.last_mut()?;
                if frame.expect != Expect::CommaOrClose {
                    return None;
                }
                frame.expect = match frame.container {
                    Container::Object => Expect::Key,
                    Container::Array => Expect::Value,
                };
                Some(Scalar::None)
            }
            '"' => {
                if self.can_start_key() {
                    Some(Scalar::String(StringScan::new(true)))
                } else if self.can_start_value() {
                    Some(Scalar::String(StringScan::new(false)))
                } else {
                    None
                }
            }
            '-' | '0'..='9' if self.can_start_value() => Some(Scalar::Number),
            't' | 'f' | 'n' if self.can_start_value() => Some(Scalar::Literal { start: idx }),
            _ => None,
        }
    }

    /// Cut point for a dangling fragment: end of the innermost clean member
    fn clean_end(&self) -> Option<usize> {
        self.stack.last().map(|frame| frame.clean_end)
    }

    fn closers(&self) -> String {
        self.stack.iter().rev().map(|f| f.container.closer()).collect()
    }
}

/// Complete a truncated JSON text into one that should parse strictly.
///
/// Returns `None` when the text is structurally invalid (not merely cut off)
/// or when nothing parseable remains.
#[must_use]
pub fn repair(text: &str) -> Option<String> {
    let mut scanner = Scanner {
        stack: Vec::new(),
        root_done: false,
    };
    let mut scalar = Scalar::None;

    for (idx, ch) in text.char_indices() {
        match &mut scalar {
            Scalar::String(scan) => {
                if scan.step(idx, ch) {
                    if scan.is_key {
                        scanner.key_done();
                    } else {
                        scanner.value_done(idx + 1);
                    }
                    scalar = Scalar::None;
                }
                continue;
            }
            Scalar::Number => {
                if is_number_char(ch) {
                    continue;
                }
                scanner.value_done(idx);
                scalar = Scalar::None;
            }
            Scalar::Literal { start } => {
                if ch.is_ascii_alphabetic() {
                    continue;
                }
                if !is_complete_literal(&text[*start..idx]) {
                    return None;
                }
                scanner.value_done(idx);
                scalar = Scalar::None;
            }
            Scalar::None => {}
        }

        if ch.is_whitespace() {
            continue;
        }
        scalar = scanner.structural(idx, ch)?;
    }

    let mut repaired = match scalar {
        Scalar::String(scan) if !scan.is_key => {
            let mut kept = text[..scan.safe_end(text.len())].to_string();
            kept.push('"');
            kept
        }
        Scalar::Literal { start } if is_complete_literal(&text[start..]) => text.to_string(),
        Scalar::String(_) | Scalar::Number | Scalar::Literal { .. } => {
            text[..scanner.clean_end()?].to_string()
        }
        Scalar::None => match scanner.stack.last() {
            None if scanner.root_done => text.to_string(),
            None => return None,
            Some(frame) if matches!(frame.expect, Expect::Open | Expect::CommaOrClose) => {
                text.to_string()
            }
            Some(frame) => text[..frame.clean_end].to_string(),
        },
    };

    repaired.push_str(&scanner.closers());
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn lenient(text: &str) -> Option<Value> {
        parse_partial(text)
    }

    #[test]
    fn test_complete_document_parses_strictly() {
        assert_eq!(
            lenient(r#"{"title":"Save more"}"#),
            Some(json!({"title": "Save more"}))
        );
    }

    #[test]
    fn test_dangling_key_is_dropped() {
        assert_eq!(lenient(r#"{"tit"#), Some(json!({})));
        assert_eq!(lenient(r#"{"title""#), Some(json!({})));
        assert_eq!(lenient(r#"{"title":"#), Some(json!({})));
        assert_eq!(
            lenient(r#"{"title":"X","steps""#),
            Some(json!({"title": "X"}))
        );
    }

    #[test]
    fn test_open_string_is_closed() {
        assert_eq!(lenient(r#"{"title":"Sav"#), Some(json!({"title": "Sav"})));
        assert_eq!(lenient(r#"{"title":""#), Some(json!({"title": ""})));
    }

    #[test]
    fn test_nested_containers_close_innermost_first() {
        assert_eq!(
            lenient(r#"{"title":"X","steps":[{"action":"Do"#),
            Some(json!({"title": "X", "steps": [{"action": "Do"}]}))
        );
        assert_eq!(lenient(r#"{"steps":[{"#), Some(json!({"steps": [{}]})));
        assert_eq!(lenient(r#"{"steps":["#), Some(json!({"steps": []})));
    }

    #[test]
    fn test_trailing_partial_string_kept_verbatim() {
        assert_eq!(
            lenient(r#"{"title":"X","steps":[{"action":"Do "#),
            Some(json!({"title": "X", "steps": [{"action": "Do "}]}))
        );
    }

    #[test]
    fn test_trailing_comma_removed() {
        assert_eq!(lenient(r#"{"a":"b","#), Some(json!({"a": "b"})));
        assert_eq!(lenient(r#"{"tips":["a","#), Some(json!({"tips": ["a"]})));
    }

    #[test]
    fn test_unterminated_number_is_dropped() {
        assert_eq!(lenient(r#"{"a":"x","n":12"#), Some(json!({"a": "x"})));
        assert_eq!(lenient(r#"{"n":-"#), Some(json!({})));
        assert_eq!(lenient(r#"[1,2"#), Some(json!([1])));
    }

    #[test]
    fn test_number_terminated_by_delimiter_is_kept() {
        assert_eq!(lenient(r#"{"n":12,"#), Some(json!({"n": 12})));
        assert_eq!(
            lenient(r#"{"steps":[{"step":1,"action":"Pay"#),
            Some(json!({"steps": [{"step": 1, "action": "Pay"}]}))
        );
        assert_eq!(lenient(r#"{"n":1.5 "#), Some(json!({"n": 1.5})));
    }

    #[test]
    fn test_literals() {
        assert_eq!(lenient(r#"{"a":tr"#), Some(json!({})));
        assert_eq!(lenient(r#"{"a":true"#), Some(json!({"a": true})));
        assert_eq!(lenient(r#"{"a":null,"b":fa"#), Some(json!({"a": null})));
    }

    #[test]
    fn test_incomplete_escape_is_dropped() {
        assert_eq!(lenient(r#"{"a":"line\"#), Some(json!({"a": "line"})));
        assert_eq!(lenient(r#"{"a":"x\u00"#), Some(json!({"a": "x"})));
        assert_eq!(lenient(r#"{"a":"xé"#), Some(json!({"a": "xé"})));
        assert_eq!(lenient(r#"{"a":"q\"uote"#), Some(json!({"a": "q\"uote"})));
    }

    #[test]
    fn test_unpaired_high_surrogate_is_dropped() {
        assert_eq!(lenient(r#"{"a":"hi \ud83d"#), Some(json!({"a": "hi "})));
        assert_eq!(lenient(r#"{"a":"hi \ud83d\ude"#), Some(json!({"a": "hi "})));
        assert_eq!(
            lenient(r#"{"a":"hi 😀"#),
            Some(json!({"a": "hi \u{1F600}"}))
        );
    }

    #[test]
    fn test_empty_and_garbage_inputs() {
        assert_eq!(lenient(""), None);
        assert_eq!(lenient("   "), None);
        assert_eq!(lenient("{]"), None);
        assert_eq!(lenient(r#"{"a" "b"}"#), None);
        assert_eq!(lenient(r#"{"a":1} trailing"#), None);
        assert_eq!(lenient("Sure! Here is"), None);
    }

    #[test]
    fn test_top_level_scalars() {
        assert_eq!(lenient(r#""partial"#), Some(json!("partial")));
        assert_eq!(lenient("{"), Some(json!({})));
        assert_eq!(lenient("["), Some(json!([])));
    }

    #[test]
    fn test_repair_output() {
        assert_eq!(repair(r#"{"a":[1,{"b":"c"#).as_deref(), Some(r#"{"a":[1,{"b":"c"}]}"#));
        assert_eq!(repair(r#"{"a":1,"#).as_deref(), Some(r#"{"a":1}"#));
    }
}
