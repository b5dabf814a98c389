//! Output lines produced by a running process

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Stdout => f.write_str("stdout"),
            LogSource::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of process output, without its trailing newline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Which pipe the line came from
    pub source: LogSource,
    /// The decoded line text
    pub text: String,
}

impl OutputLine {
    /// Create a new output line
    pub fn new(source: LogSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    /// Create a stdout line
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(LogSource::Stdout, text)
    }

    /// Create a stderr line
    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(LogSource::Stderr, text)
    }

    /// Returns true if the line came from stderr
    pub fn is_stderr(&self) -> bool {
        self.source == LogSource::Stderr
    }
}
