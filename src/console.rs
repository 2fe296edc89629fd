//! Terminal output shared by the prompt, agent replies and workload logs.
//!
//! Only the session writes here. Anything printed while the prompt is showing
//! clears the prompt line first and redraws it afterwards, so log lines never
//! land in the middle of what the user is typing.

use std::io::{self, IsTerminal, Write};

pub const PROMPT: &str = "You: ";
const CLEAR_LINE: &str = "\r\x1b[2K";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Notice,
    Aside,
    Warning,
    Error,
    Agent,
}

impl Tone {
    fn ansi(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Notice => Some("\x1b[1m"),
            Self::Aside => Some("\x1b[2m"),
            Self::Warning => Some("\x1b[33m"),
            Self::Error => Some("\x1b[31m"),
            Self::Agent => Some("\x1b[34m"),
        }
    }
}

pub struct Console {
    out: Box<dyn Write + Send>,
    color: bool,
    prompt_visible: bool,
    /// Streamed agent text left the cursor mid-line.
    mid_line: bool,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>, color: bool) -> Self {
        Self {
            out,
            color,
            prompt_visible: false,
            mid_line: false,
        }
    }

    pub fn stdout() -> Self {
        let color = io::stdout().is_terminal();
        Self::new(Box::new(io::stdout()), color)
    }

    pub fn prompt_visible(&self) -> bool {
        self.prompt_visible
    }

    pub fn show_prompt(&mut self) {
        if self.prompt_visible {
            return;
        }
        self.finish_partial_line();
        let prompt = self.paint(Tone::Notice, PROMPT);
        self.write(&prompt);
        self.prompt_visible = true;
        self.flush();
    }

    pub fn hide_prompt(&mut self) {
        if self.prompt_visible {
            self.write(CLEAR_LINE);
            self.prompt_visible = false;
            self.flush();
        }
    }

    /// The user pressed Enter; the terminal already moved past the prompt line.
    pub fn input_submitted(&mut self) {
        self.prompt_visible = false;
    }

    pub fn line(&mut self, tone: Tone, text: &str) {
        let redraw = self.prompt_visible;
        self.hide_prompt();
        self.finish_partial_line();
        for line in text.lines() {
            let painted = self.paint(tone, line);
            self.write(&painted);
            self.write("\n");
        }
        if text.is_empty() {
            self.write("\n");
        }
        if redraw {
            self.show_prompt();
        } else {
            self.flush();
        }
    }

    pub fn blank_line(&mut self) {
        self.line(Tone::Plain, "");
    }

    pub fn notice(&mut self, text: &str) {
        self.line(Tone::Notice, text);
    }

    pub fn aside(&mut self, text: &str) {
        self.line(Tone::Aside, text);
    }

    pub fn warning(&mut self, text: &str) {
        self.line(Tone::Warning, text);
    }

    pub fn error(&mut self, text: &str) {
        self.line(Tone::Error, text);
    }

    pub fn agent_header(&mut self) {
        self.blank_line();
        self.line(Tone::Agent, "Agent:");
    }

    /// Append streamed reply text as-is.
    pub fn agent_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.hide_prompt();
        self.write(text);
        self.mid_line = !text.ends_with('\n');
        self.flush();
    }

    pub fn end_agent_reply(&mut self) {
        self.finish_partial_line();
        self.blank_line();
    }

    fn finish_partial_line(&mut self) {
        if self.mid_line {
            self.write("\n");
            self.mid_line = false;
        }
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        match (self.color, tone.ansi()) {
            (true, Some(code)) => format!("{code}{text}\x1b[0m"),
            _ => text.to_owned(),
        }
    }

    fn write(&mut self, text: &str) {
        if let Err(error) = self.out.write_all(text.as_bytes()) {
            tracing::debug!(%error, "console write failed");
        }
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }
}
