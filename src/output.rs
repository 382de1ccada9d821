//! Formatted report sink.
//!
//! Every line is prefixed with two spaces per nesting level so payloads
//! dispatched from inside a container read as a sub-report.

use crate::util::hex_dump;
use std::io::Write;

const REVERSE: (&str, &str) = ("\x1b[7m", "\x1b[27m");
const DIM: (&str, &str) = ("\x1b[2m", "\x1b[22m");
const UNDERLINE: (&str, &str) = ("\x1b[4m", "\x1b[24m");

pub struct Output<'w> {
    w: &'w mut dyn Write,
    depth: usize,
}

impl<'w> Output<'w> {
    pub fn new(w: &'w mut dyn Write) -> Self {
        Self { w, depth: 0 }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    fn indent(&mut self) -> std::io::Result<()> {
        for _ in 0..self.depth {
            self.w.write_all(b"  ")?;
        }
        Ok(())
    }

    /// One line of plain text. An empty string prints a blank line.
    pub fn line(&mut self, text: impl AsRef<str>) -> std::io::Result<()> {
        self.indent()?;
        writeln!(self.w, "{}", text.as_ref())
    }

    pub fn blank(&mut self) -> std::io::Result<()> {
        self.line("")
    }

    /// `label` padded to `width`, dimmed, then the value.
    pub fn form(&mut self, label: &str, value: impl std::fmt::Display, width: usize) -> std::io::Result<()> {
        self.indent()?;
        writeln!(self.w, "{}{:<width$}:{} {}", DIM.0, label, DIM.1, value, width = width)
    }

    pub fn header(&mut self, title: impl AsRef<str>) -> std::io::Result<()> {
        self.indent()?;
        writeln!(self.w, "{}{}{}", UNDERLINE.0, title.as_ref(), UNDERLINE.1)
    }

    pub fn reversed(&mut self, prefix: &str, text: impl std::fmt::Display) -> std::io::Result<()> {
        self.indent()?;
        writeln!(self.w, "{}{}{}{}", prefix, REVERSE.0, text, REVERSE.1)
    }

    /// Text that may span several lines, each one indented.
    pub fn multiline(&mut self, text: &str) -> std::io::Result<()> {
        for l in text.lines() {
            self.line(l)?;
        }
        Ok(())
    }

    pub fn hex(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.multiline(&hex_dump(bytes, 0))
    }
}

/// Enable ANSI escape processing on consoles that need it.
pub fn setup() {
    #[cfg(windows)]
    {
        let _ = colored::control::set_virtual_terminal(true);
    }
}
