//! Buffered, run-to-completion process execution
//!
//! [`ProcessRunner`] is the simple counterpart of the streaming executor: it
//! waits for the child to exit and hands back everything it wrote. There is no
//! timeout, so it is meant for short diagnostic invocations.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::CapturedOutput;
use async_process::Stdio;
use futures_lite::future;
use tracing::debug;

/// Runs a process to completion and captures its output
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner
    pub fn new() -> Self {
        Self
    }

    /// Run `command`, blocking the current thread until it exits
    pub fn run(&self, command: &Command) -> Result<CapturedOutput> {
        future::block_on(self.output(command))
    }

    /// Run `command` and await its exit.
    ///
    /// Both pipes are drained concurrently, so a child writing a lot to one
    /// of them cannot deadlock against a full pipe buffer.
    pub async fn output(&self, command: &Command) -> Result<CapturedOutput> {
        let program = command.program_name();
        let child = command
            .prepare()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::spawn_failed(&program, e))?;
        let pid = child.id();
        let output = child
            .output()
            .await
            .map_err(|e| Error::wait_failed(pid, e))?;

        let captured = CapturedOutput {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program = %program, status = %captured.status, "process finished");
        Ok(captured)
    }
}

/// Run `program` with `args` to completion
pub fn run<I, S>(program: &str, args: I) -> Result<CapturedOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let command = Command::builder(program).args(args).build();
    ProcessRunner::new().run(&command)
}
