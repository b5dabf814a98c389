//! Streaming process execution
//!
//! [`StreamingExecutor::stream`] spawns a child with both output pipes
//! captured and returns an [`OutputStream`]. Each pipe gets its own reader
//! task that splits raw chunks into lines and pushes them into one bounded
//! channel. A supervisor task owns the child: it reaps the process as soon as
//! it exits, gives the readers a short window to drain what is left in the
//! pipes, or, when the consumer goes away first, terminates the process group.
//!
//! Background jobs started by the child inherit its pipes, so end-of-file can
//! arrive long after the child itself is gone. The drain window bounds how
//! long the stream waits for it.
//!
//! ```text
//! stdout ──pump──┐
//!                ├──> channel ──> OutputStream ──> consumer
//! stderr ──pump──┘                     │
//!                        supervisor (wait → drain / SIGTERM → grace → SIGKILL)
//! ```

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{LogSource, OutputLine};
use crate::launcher::{Launcher, LineStream};
use crate::lines::LineBuffer;
use crate::process::ExitStatus;
use async_channel::{Receiver, Sender};
use async_process::{Child, Stdio};
use async_trait::async_trait;
use futures::stream::Stream;
use futures_lite::future;
use futures_lite::io::{AsyncRead, AsyncReadExt};
use smol::{Task, Timer};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How long a cancelled process gets to exit after SIGTERM before SIGKILL
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// How long readers may keep draining the pipes after the child has exited
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 8 * 1024;
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Launches processes and streams their output line by line
#[derive(Debug, Clone, Copy)]
pub struct StreamingExecutor {
    termination_grace: Duration,
    drain_window: Duration,
}

impl Default for StreamingExecutor {
    fn default() -> Self {
        Self {
            termination_grace: DEFAULT_TERMINATION_GRACE,
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }
}

impl StreamingExecutor {
    /// Create an executor with the default termination grace period
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long a cancelled process may take to exit before it is killed
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// The configured termination grace period
    pub fn termination_grace(&self) -> Duration {
        self.termination_grace
    }

    /// Set how long output is still collected after the child has exited.
    ///
    /// Pipes held open past this window by processes the child left behind
    /// are closed, and the stream ends with the child's exit status.
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// The configured drain window
    pub fn drain_window(&self) -> Duration {
        self.drain_window
    }

    /// Spawn `command` and stream its output.
    ///
    /// Fails with [`Error::SpawnFailed`] before producing a stream if the
    /// executable cannot be launched.
    pub fn stream(&self, command: &Command) -> Result<OutputStream> {
        let program = command.program_name();

        let mut cmd = command.prepare();
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(&program, e))?;
        let pid = child.id();
        debug!(pid, program = %program, "process started");

        let (line_tx, line_rx) = async_channel::bounded(LINE_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(smol::spawn(pump(pid, LogSource::Stdout, stdout, line_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(smol::spawn(pump(pid, LogSource::Stderr, stderr, line_tx.clone())));
        }
        // Only the readers hold senders, so the channel closes once both hit EOF
        drop(line_tx);

        let (cancel_tx, cancel_rx) = async_channel::bounded(1);
        let supervisor = smol::spawn(supervise(
            child,
            readers,
            cancel_rx,
            self.termination_grace,
            self.drain_window,
        ));

        Ok(OutputStream {
            pid,
            lines: Box::pin(line_rx),
            supervisor: Some(supervisor),
            cancel: Some(cancel_tx),
            state: State::Lines,
            exit: None,
        })
    }
}

#[async_trait]
impl Launcher for StreamingExecutor {
    type Lines = OutputStream;

    async fn launch(&self, command: Command) -> Result<OutputStream> {
        self.stream(&command)
    }
}

/// Spawn `program` with `args` using the default executor
pub fn stream<I, S>(program: &str, args: I) -> Result<OutputStream>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let command = Command::builder(program).args(args).build();
    StreamingExecutor::new().stream(&command)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Forwarding lines from the readers
    Lines,
    /// The readers are done, waiting for the supervisor's exit status
    Reaping,
    Done,
}

/// Live output of one process.
///
/// Yields lines in the order each pipe produced them; lines from stdout and
/// stderr are merged first-come first-served. The stream ends exactly once,
/// after the child is reaped and its pipes are drained or the drain window
/// has passed. Dropping it early terminates the process.
pub struct OutputStream {
    pid: u32,
    lines: Pin<Box<Receiver<Result<OutputLine>>>>,
    supervisor: Option<Task<Result<ExitStatus>>>,
    cancel: Option<Sender<()>>,
    state: State,
    exit: Option<ExitStatus>,
}

impl OutputStream {
    /// Process ID of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, once the stream has ended
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Returns true once no further items will be produced
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Stop consuming, terminate the process and wait until it is reaped
    pub async fn cancel(mut self) -> Result<ExitStatus> {
        self.state = State::Done;
        self.cancel.take();
        self.lines.close();

        match self.supervisor.take() {
            Some(task) => {
                let status = task.await?;
                self.exit = Some(status);
                Ok(status)
            }
            None => self
                .exit
                .ok_or_else(|| Error::wait_failed(self.pid, "exit status unavailable")),
        }
    }

    /// End the stream after a read failure and let the supervisor clean up
    fn abort(&mut self) {
        self.state = State::Done;
        self.cancel.take();
        self.lines.close();
        if let Some(task) = self.supervisor.take() {
            task.detach();
        }
    }
}

impl Stream for OutputStream {
    type Item = Result<OutputLine>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.state {
                State::Lines => match this.lines.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(line))) => return Poll::Ready(Some(Ok(line))),
                    Poll::Ready(Some(Err(e))) => {
                        this.abort();
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(None) => this.state = State::Reaping,
                    Poll::Pending => return Poll::Pending,
                },
                State::Reaping => {
                    let Some(task) = this.supervisor.as_mut() else {
                        this.state = State::Done;
                        continue;
                    };
                    let result = ready!(Pin::new(task).poll(cx));
                    this.supervisor = None;
                    this.cancel = None;
                    this.state = State::Done;
                    return match result {
                        Ok(status) => {
                            this.exit = Some(status);
                            Poll::Ready(None)
                        }
                        Err(e) => Poll::Ready(Some(Err(e))),
                    };
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

#[async_trait]
impl LineStream for OutputStream {
    fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    async fn cancel(self) -> Result<ExitStatus> {
        OutputStream::cancel(self).await
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.take() {
            debug!(pid = self.pid, "output stream dropped before exit, terminating process");
            self.cancel.take();
            self.lines.close();
            task.detach();
        }
    }
}

/// Reader loop for one pipe
async fn pump<R>(pid: u32, source: LogSource, mut pipe: R, lines: Sender<Result<OutputLine>>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(pid, %source, error = %e, "pipe read failed");
                let _ = lines.send(Err(Error::stream_failed(pid, source, e))).await;
                return;
            }
        };

        for text in buffer.push(&chunk[..read]) {
            if lines.send(Ok(OutputLine::new(source, text))).await.is_err() {
                trace!(pid, %source, "line receiver closed, reader stopping");
                return;
            }
        }
    }

    if let Some(text) = buffer.finish() {
        let _ = lines.send(Ok(OutputLine::new(source, text))).await;
    }
    trace!(pid, %source, "pipe drained");
}

/// Owns the child until it is reaped
async fn supervise(
    mut child: Child,
    readers: Vec<Task<()>>,
    cancel: Receiver<()>,
    grace: Duration,
    drain_window: Duration,
) -> Result<ExitStatus> {
    let pid = child.id();

    let outcome = {
        let exited = async { Some(child.status().await) };
        let cancelled = async {
            // Resolves when the stream drops its sender
            let _ = cancel.recv().await;
            None
        };
        future::or(exited, cancelled).await
    };

    match outcome {
        Some(status) => {
            let status = ExitStatus::from(status.map_err(|e| Error::wait_failed(pid, e))?);
            debug!(pid, %status, "process exited");
            drain(pid, readers, drain_window).await;
            Ok(status)
        }
        None => {
            // Dropping the readers cancels them and closes the pipes
            drop(readers);
            terminate(&mut child, pid, grace).await
        }
    }
}

/// Let the readers finish, cancelling whatever is still running after `window`
async fn drain(pid: u32, readers: Vec<Task<()>>, window: Duration) {
    let finished = async {
        for reader in readers {
            reader.await;
        }
        true
    };
    let expired = async {
        Timer::after(window).await;
        false
    };
    if !future::or(finished, expired).await {
        debug!(pid, ?window, "pipes still open after exit, closing them");
    }
}

/// SIGTERM the process group, escalating to SIGKILL after `grace`
async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> Result<ExitStatus> {
    debug!(pid, ?grace, "terminating process");

    #[cfg(unix)]
    if let Err(e) = crate::process::terminate_group(pid) {
        warn!(pid, error = %e, "SIGTERM failed");
    }
    #[cfg(not(unix))]
    let _ = child.kill();

    let exited = async { Some(child.status().await) };
    let expired = async {
        Timer::after(grace).await;
        None
    };
    let outcome = future::or(exited, expired).await;

    let status = match outcome {
        Some(status) => status,
        None => {
            warn!(pid, ?grace, "process ignored SIGTERM, sending SIGKILL");
            #[cfg(unix)]
            if let Err(e) = crate::process::kill_group(pid) {
                warn!(pid, error = %e, "SIGKILL of process group failed");
            }
            let _ = child.kill();
            child.status().await
        }
    };

    let status = ExitStatus::from(status.map_err(|e| Error::wait_failed(pid, e))?);
    debug!(pid, %status, "terminated process reaped");
    Ok(status)
}
