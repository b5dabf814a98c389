//! Error types for command execution

use crate::event::LogSource;
use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// The executable could not be launched
    #[error("failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// The program that was being launched
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Reading from a live process pipe failed after a successful spawn
    #[error("failed reading {source_name} of process {pid}: {reason}")]
    StreamFailed {
        /// Process ID of the child
        pid: u32,
        /// Which pipe failed
        source_name: LogSource,
        /// The underlying read error
        reason: String,
    },

    /// Waiting for the child to exit failed
    #[error("failed to wait for process {pid}: {reason}")]
    WaitFailed {
        /// Process ID of the child
        pid: u32,
        /// The reason for the failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl ToString) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a stream failed error
    pub fn stream_failed(pid: u32, source: LogSource, reason: impl ToString) -> Self {
        Self::StreamFailed {
            pid,
            source_name: source,
            reason: reason.to_string(),
        }
    }

    /// Create a wait failed error
    pub fn wait_failed(pid: u32, reason: impl ToString) -> Self {
        Self::WaitFailed {
            pid,
            reason: reason.to_string(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Returns true if the process never started
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Error::SpawnFailed { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
