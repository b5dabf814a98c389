//! Launcher trait for starting processes that stream their output

use crate::command::Command;
use crate::error::Result;
use crate::event::OutputLine;
use crate::process::ExitStatus;
use async_trait::async_trait;
use futures::stream::Stream;

/// A live sequence of output lines from one process.
///
/// The stream ends once the process has exited and both of its pipes are
/// drained. An `Err` item is terminal: nothing follows it.
#[async_trait]
pub trait LineStream: Stream<Item = Result<OutputLine>> + Send + Unpin {
    /// Exit status of the process, available after the stream has ended
    fn exit_status(&self) -> Option<ExitStatus>;

    /// Stop the process and wait until it has been reaped
    async fn cancel(self) -> Result<ExitStatus>
    where
        Self: Sized;
}

/// Something that can start a command and stream its output
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// The line stream type this launcher produces
    type Lines: LineStream + 'static;

    /// Start `command`. Spawn failures are returned here, before any line.
    async fn launch(&self, command: Command) -> Result<Self::Lines>;
}
