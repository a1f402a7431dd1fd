//! Command representation and the file-backed command source.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::StreamError;
use crate::protocol::LINE_TERMINATOR;

/// Commands safe to blindly resend from scratch: idempotent or
/// state-resetting. Motion commands stay off this list because resending
/// a partially executed move can duplicate physical motion.
pub const SAFE_COMMAND_PREFIXES: &[&str] = &["G0", "M5", "M9", "M30", "G28", "G53"];

/// Resumes the controller from sleep or feed hold.
pub const WAKE_COMMAND: &str = "~";

/// One line of the control protocol, stored without its terminator. The
/// content is opaque to the streamer; it only cares about length and the
/// retry allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
}

impl Command {
    /// Builds a command from a raw input line: strips any `;` comment,
    /// trims whitespace, and yields nothing for a line with no content
    /// left.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = match raw.find(';') {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let code = code.trim();
        if code.is_empty() {
            None
        } else {
            Some(Self {
                text: code.to_string(),
            })
        }
    }

    pub fn wake() -> Self {
        Self {
            text: WAKE_COMMAND.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bytes that go on the wire: the command plus CR LF.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + LINE_TERMINATOR.len());
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.extend_from_slice(LINE_TERMINATOR);
        bytes
    }

    /// Single-character commands are echoed with a doubled acknowledgment
    /// by the controller, which changes the completion sentinel.
    pub fn is_short(&self) -> bool {
        self.text.len() == 1
    }

    pub fn is_safe_to_retry(&self) -> bool {
        self.text == WAKE_COMMAND
            || SAFE_COMMAND_PREFIXES
                .iter()
                .any(|prefix| self.text.starts_with(prefix))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Lazy iterator over the commands in a G-code file. Comment-only and
/// blank lines produce no command.
pub struct GcodeSource<R: BufRead> {
    lines: Lines<R>,
}

impl GcodeSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> GcodeSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for GcodeSource<R> {
    type Item = Result<Command, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(command) = Command::parse(&line) {
                        return Some(Ok(command));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
