//! Answer Rendering
//!
//! Lays a [`PartialAnswer`] out as wrapped terminal lines and redraws it in
//! place on every published snapshot. The free-form `content` field is fed
//! through a [`TokenStream`] so a half-received word never flashes on screen.

use std::io::{self, Write};

use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor, queue};

use advisor_core::{PartialAnswer, SessionOutcome, SessionState, SessionView, TokenStream};

/// Colors
const TITLE: Color = Color::Rgb {
    r: 120,
    g: 200,
    b: 160,
};
const HEADING: Color = Color::Rgb {
    r: 150,
    g: 180,
    b: 255,
};
const WARNING: Color = Color::Rgb {
    r: 255,
    g: 200,
    b: 100,
};
const ERROR: Color = Color::Rgb {
    r: 255,
    g: 100,
    b: 100,
};

/// How a line is styled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    /// Answer title
    Title,
    /// Section heading
    Heading,
    /// Ordinary text
    Body,
    /// Status: still streaming or validated
    Status,
    /// Status: degraded answer
    Warning,
    /// Status: request failed
    Error,
}

/// One rendered line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// Text, already wrapped to the terminal width
    pub text: String,
    /// Style
    pub kind: LineKind,
}

impl Line {
    fn new(text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Word-stable view of the growing `content` field
#[derive(Debug, Default)]
pub struct ContentTicker {
    fed: String,
    stream: TokenStream,
    words: Vec<String>,
}

impl ContentTicker {
    /// Feed the latest content; returns the words that are safe to show
    ///
    /// Content normally grows by appending. If a snapshot rewrote earlier
    /// text the ticker starts over from the new value.
    pub fn update(&mut self, content: &str) -> String {
        match content.strip_prefix(self.fed.as_str()) {
            Some(appended) => self.words.extend(self.stream.push(appended)),
            None => {
                self.stream.reset();
                self.words = self.stream.push(content);
            }
        }
        self.fed = content.to_string();
        self.words.join(" ")
    }

    /// End of stream: release the withheld word
    pub fn finish(&mut self) -> String {
        self.words.extend(self.stream.finish());
        self.words.join(" ")
    }
}

fn wrapped(out: &mut Vec<Line>, text: &str, width: usize, indent: &str, kind: LineKind) {
    let options = textwrap::Options::new(width)
        .initial_indent(indent)
        .subsequent_indent("   ");
    out.extend(
        textwrap::wrap(text, options)
            .into_iter()
            .map(|l| Line::new(l.into_owned(), kind)),
    );
}

/// Lay out an answer; `content` is the word-stable content text
#[must_use]
pub fn layout(answer: &PartialAnswer, content: &str, width: usize) -> Vec<Line> {
    let width = width.max(20);
    let mut lines = Vec::new();

    if let Some(ref title) = answer.title {
        wrapped(&mut lines, title, width, "", LineKind::Title);
    }
    if let Some(ref description) = answer.description {
        wrapped(&mut lines, description, width, "", LineKind::Body);
    }

    if let Some(ref strategies) = answer.strategies {
        lines.push(Line::new("", LineKind::Body));
        lines.push(Line::new("Strategies", LineKind::Heading));
        for strategy in strategies {
            let text = match (&strategy.name, &strategy.detail) {
                (Some(name), Some(detail)) => format!("{name}: {detail}"),
                (Some(name), None) => name.clone(),
                (None, Some(detail)) => detail.clone(),
                (None, None) => continue,
            };
            wrapped(&mut lines, &text, width, " • ", LineKind::Body);
        }
    }

    if let Some(ref steps) = answer.steps {
        lines.push(Line::new("", LineKind::Body));
        lines.push(Line::new("Steps", LineKind::Heading));
        for (i, step) in steps.iter().enumerate() {
            let Some(ref action) = step.action else { continue };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let number = step.step.map_or(i + 1, |n| n as usize);
            wrapped(&mut lines, action, width, &format!("{number:>2}. "), LineKind::Body);
        }
    }

    if !content.is_empty() {
        lines.push(Line::new("", LineKind::Body));
        wrapped(&mut lines, content, width, "", LineKind::Body);
    }

    if let Some(ref tips) = answer.tips {
        lines.push(Line::new("", LineKind::Body));
        lines.push(Line::new("Tips", LineKind::Heading));
        for tip in tips {
            wrapped(&mut lines, tip, width, " - ", LineKind::Body);
        }
    }

    lines
}

/// The line under the answer
#[must_use]
pub fn status_line(view: &SessionView) -> Line {
    let chunks = view.chunk_count;
    match (&view.state, &view.outcome) {
        (_, Some(SessionOutcome::Validated { .. })) => {
            Line::new(format!("✓ validated ({chunks} chunks)"), LineKind::Status)
        }
        (_, Some(SessionOutcome::Interrupted { reason })) => Line::new(
            format!("⚠ degraded: {reason} ({chunks} chunks)"),
            LineKind::Warning,
        ),
        (_, Some(SessionOutcome::SchemaViolation { violation })) => Line::new(
            format!("⚠ degraded: {violation}"),
            LineKind::Warning,
        ),
        (_, Some(SessionOutcome::Failed { error })) => {
            Line::new(format!("✗ failed: {error}"), LineKind::Error)
        }
        (SessionState::Receiving, None) => {
            Line::new(format!("… streaming ({chunks} chunks)"), LineKind::Status)
        }
        (state, None) => Line::new(format!("… {state:?}").to_lowercase(), LineKind::Status),
    }
}

/// Redraws one session's answer in place
pub struct Renderer<W: Write> {
    out: W,
    width: usize,
    height: usize,
    interactive: bool,
    drawn: u16,
    content: ContentTicker,
}

impl<W: Write> Renderer<W> {
    /// Renderer writing to `out`
    ///
    /// When `interactive` is false nothing is drawn until [`finish`](Self::finish),
    /// which then prints plain text. `height` is the terminal's row count; a
    /// live frame taller than that shows only its last rows.
    pub fn new(out: W, width: usize, height: usize, interactive: bool) -> Self {
        Self {
            out,
            width,
            height,
            interactive,
            drawn: 0,
            content: ContentTicker::default(),
        }
    }

    /// Redraw for a new snapshot
    ///
    /// # Errors
    ///
    /// Returns any terminal write error.
    pub fn draw(&mut self, view: &SessionView) -> io::Result<()> {
        let content = view
            .answer
            .as_ref()
            .and_then(|a| a.content.as_deref())
            .unwrap_or_default();
        let content = self.content.update(content);
        if self.interactive {
            self.paint(view, &content, false)?;
        }
        Ok(())
    }

    /// Draw the terminal frame, releasing any withheld word
    ///
    /// The whole answer is printed, scrolling the terminal if it has to.
    ///
    /// # Errors
    ///
    /// Returns any terminal write error.
    pub fn finish(&mut self, view: &SessionView) -> io::Result<()> {
        let content = view
            .answer
            .as_ref()
            .and_then(|a| a.content.as_deref())
            .unwrap_or_default();
        self.content.update(content);
        let content = self.content.finish();
        self.paint(view, &content, true)
    }

    /// Rows a live frame may occupy
    ///
    /// One row stays free for the cursor; moving up further than the screen
    /// would leave stale rows behind in the scrollback.
    fn live_rows(&self) -> usize {
        self.height.saturating_sub(1).max(1)
    }

    fn paint(&mut self, view: &SessionView, content: &str, last: bool) -> io::Result<()> {
        let empty = PartialAnswer::default();
        let mut lines = layout(view.answer.as_ref().unwrap_or(&empty), content, self.width);
        lines.push(Line::new("", LineKind::Body));
        lines.push(status_line(view));

        if !self.interactive {
            for line in &lines {
                writeln!(self.out, "{}", line.text)?;
            }
            return self.out.flush();
        }

        if self.drawn > 0 {
            queue!(self.out, cursor::MoveToPreviousLine(self.drawn))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;

        let visible = if last {
            &lines[..]
        } else {
            &lines[lines.len().saturating_sub(self.live_rows())..]
        };

        for line in visible {
            match line.kind {
                LineKind::Title => queue!(
                    self.out,
                    SetForegroundColor(TITLE),
                    SetAttribute(Attribute::Bold)
                )?,
                LineKind::Heading => queue!(self.out, SetForegroundColor(HEADING))?,
                LineKind::Warning => queue!(self.out, SetForegroundColor(WARNING))?,
                LineKind::Error => queue!(self.out, SetForegroundColor(ERROR))?,
                LineKind::Status => queue!(self.out, SetAttribute(Attribute::Dim))?,
                LineKind::Body => {}
            }
            queue!(
                self.out,
                Print(&line.text),
                SetAttribute(Attribute::Reset),
                ResetColor,
                Print("\r\n")
            )?;
        }

        self.drawn = u16::try_from(visible.len()).unwrap_or(u16::MAX);
        self.out.flush()
    }
}
