//! Local process execution with live, line-oriented output
//!
//! This crate provides two ways to run an external program:
//!
//! - [`ProcessRunner`] runs a process to completion and returns its exit
//!   status together with fully buffered stdout and stderr.
//! - [`StreamingExecutor`] spawns a process and returns an [`OutputStream`]
//!   that yields [`OutputLine`]s as the process writes them, tagged with the
//!   pipe they came from. Dropping the stream terminates the process.
//!
//! The [`Launcher`] trait abstracts over the streaming side so that callers
//! can be driven by a different launcher in tests.

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod event;
pub mod executor;
pub mod launcher;
pub mod lines;
pub mod process;
pub mod runner;

pub use command::Command;
pub use error::{Error, Result};
pub use event::{LogSource, OutputLine};
pub use executor::{
    DEFAULT_DRAIN_WINDOW, DEFAULT_TERMINATION_GRACE, OutputStream, StreamingExecutor, stream,
};
pub use launcher::{Launcher, LineStream};
pub use lines::LineBuffer;
pub use process::{CapturedOutput, ExitStatus};
pub use runner::{ProcessRunner, run};
