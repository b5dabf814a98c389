//! Single-flight execution of stored commands

use crate::script::ShellEnvironment;
use crate::spawner::{SmolSpawner, Spawner};
use command_executor::{Command as Invocation, Launcher, LineStream, OutputLine, StreamingExecutor};
use futures::StreamExt;
use futures_lite::future;
use project_store::{Command, CommandId, Project, ProjectGraph, ShellKind};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Externally visible state of a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Nothing has run yet
    #[default]
    Idle,
    /// A run is in progress
    Running {
        /// "Running <command> in <project>"
        label: String,
    },
    /// The last run is over; a new one may start
    Finished {
        /// "Done: ...", "Failed: ..." or "Cancelled: ..."
        label: String,
    },
}

impl RunStatus {
    /// Human readable label, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            RunStatus::Idle => None,
            RunStatus::Running { label } | RunStatus::Finished { label } => Some(label),
        }
    }

    /// Returns true while a run is in progress
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("Idle"))
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The script exited with status 0
    Succeeded,
    /// Non-zero exit, or the script could not be launched or read
    Failed,
    /// Stopped by [`RunSession::cancel`]
    Cancelled,
}

impl RunOutcome {
    fn label(self, command: &str) -> String {
        match self {
            RunOutcome::Succeeded => format!("Done: {command}"),
            RunOutcome::Failed => format!("Failed: {command}"),
            RunOutcome::Cancelled => format!("Cancelled: {command}"),
        }
    }
}

/// Change notifications, delivered in the order the state changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A run was accepted
    Started {
        /// Command being run
        command: CommandId,
        /// Running label
        label: String,
    },
    /// A line was appended to the log
    Line(OutputLine),
    /// The run is over
    Finished {
        /// Command that ran
        command: CommandId,
        /// How it ended
        outcome: RunOutcome,
        /// Final label
        label: String,
    },
}

#[derive(Default)]
struct SessionState {
    status: RunStatus,
    log: String,
    running: Option<CommandId>,
    cancel: Option<async_channel::Sender<()>>,
    subscribers: Vec<async_channel::Sender<SessionEvent>>,
}

impl SessionState {
    fn notify(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.try_send(event.clone()).is_ok());
    }

    fn append(&mut self, line: OutputLine) {
        self.log.push_str(&line.text);
        self.log.push('\n');
        self.notify(SessionEvent::Line(line));
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs at most one command at a time and keeps its log.
///
/// `start` returns immediately; the script runs on a task handed to the
/// session's [`Spawner`]. Progress is observed by polling
/// [`current_status`](Self::current_status) and
/// [`current_log`](Self::current_log), or through [`subscribe`](Self::subscribe).
pub struct RunSession<L: Launcher = StreamingExecutor> {
    launcher: Arc<L>,
    spawner: Arc<dyn Spawner>,
    environment: ShellEnvironment,
    default_shell: ShellKind,
    state: SharedState,
}

impl<L: Launcher> Clone for RunSession<L> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            spawner: self.spawner.clone(),
            environment: self.environment.clone(),
            default_shell: self.default_shell,
            state: self.state.clone(),
        }
    }
}

impl Default for RunSession<StreamingExecutor> {
    fn default() -> Self {
        Self::new(StreamingExecutor::default())
    }
}

impl<L: Launcher> RunSession<L> {
    /// Create an idle session that launches through `launcher`
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            spawner: Arc::new(SmolSpawner),
            environment: ShellEnvironment::default(),
            default_shell: ShellKind::default(),
            state: SharedState::default(),
        }
    }

    /// Run tasks on `spawner` instead of the smol global executor
    pub fn with_spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Arc::new(spawner);
        self
    }

    /// Replace the environment bootstrap
    pub fn with_environment(mut self, environment: ShellEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Shell used by [`start`](Self::start)
    pub fn with_default_shell(mut self, shell: ShellKind) -> Self {
        self.default_shell = shell;
        self
    }

    /// Start `command` of `project` under the default shell.
    ///
    /// Returns false, changing nothing, if a run is already in progress.
    pub fn start(&self, project: &Project, command: &Command) -> bool {
        self.start_with_shell(project, command, self.default_shell)
    }

    /// Start a command of a loaded project. Commands scoped to a container
    /// run under that container's shell.
    pub fn start_scoped(&self, graph: &ProjectGraph, command: &Command) -> bool {
        let shell = command
            .container_id
            .and_then(|id| graph.container(id))
            .map_or(self.default_shell, |container| container.shell);
        self.start_with_shell(&graph.project, command, shell)
    }

    /// Start `command` of `project` under `shell`
    pub fn start_with_shell(&self, project: &Project, command: &Command, shell: ShellKind) -> bool {
        let label = format!("Running {} in {}", command.name, project.name);
        let (cancel_tx, cancel_rx) = async_channel::bounded(1);

        {
            let mut state = lock(&self.state);
            if let Some(active) = state.running {
                debug!(active, rejected = command.id, "run already in progress, ignoring start");
                return false;
            }
            state.log.clear();
            state.running = Some(command.id);
            state.status = RunStatus::Running {
                label: label.clone(),
            };
            state.cancel = Some(cancel_tx);
            state.notify(SessionEvent::Started {
                command: command.id,
                label,
            });
        }

        info!(
            command = %command.name,
            project = %project.name,
            %shell,
            root = ?project.root,
            "starting run"
        );

        let run = Run {
            launcher: self.launcher.clone(),
            state: self.state.clone(),
            invocation: self
                .environment
                .invocation(shell, &project.root, &command.script),
            command: command.id,
            name: command.name.clone(),
        };
        self.spawner.spawn(Box::pin(run.execute(cancel_rx)));
        true
    }

    /// Ask the active run to stop. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let state = lock(&self.state);
        match (&state.running, &state.cancel) {
            (Some(command), Some(cancel)) => {
                debug!(command, "cancellation requested");
                // A full channel means cancellation is already pending
                let _ = cancel.try_send(());
                true
            }
            _ => false,
        }
    }

    /// Everything the current (or last) run has printed, one line per `\n`
    pub fn current_log(&self) -> String {
        lock(&self.state).log.clone()
    }

    /// Current status
    pub fn current_status(&self) -> RunStatus {
        lock(&self.state).status.clone()
    }

    /// Id of the command being run, if any
    pub fn running_command(&self) -> Option<CommandId> {
        lock(&self.state).running
    }

    /// Returns true while a run is in progress
    pub fn is_running(&self) -> bool {
        lock(&self.state).running.is_some()
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> async_channel::Receiver<SessionEvent> {
        let (tx, rx) = async_channel::unbounded();
        lock(&self.state).subscribers.push(tx);
        rx
    }
}

/// One accepted run, moved onto the spawned task
struct Run<L: Launcher> {
    launcher: Arc<L>,
    state: SharedState,
    invocation: Invocation,
    command: CommandId,
    name: String,
}

enum Step {
    Next(Option<command_executor::Result<OutputLine>>),
    Cancel,
}

impl<L: Launcher> Run<L> {
    async fn execute(self, cancel: async_channel::Receiver<()>) {
        let mut lines = match self.launcher.launch(self.invocation.clone()).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(command = %self.name, error = %e, "run failed to start");
                self.finish(RunOutcome::Failed, Some(e.to_string()));
                return;
            }
        };

        loop {
            let step = future::or(async { Step::Next(lines.next().await) }, async {
                // A closed channel counts as a request too
                let _ = cancel.recv().await;
                Step::Cancel
            })
            .await;

            match step {
                Step::Next(Some(Ok(line))) => lock(&self.state).append(line),
                Step::Next(Some(Err(e))) => {
                    warn!(command = %self.name, error = %e, "reading output failed");
                    self.finish(RunOutcome::Failed, Some(e.to_string()));
                    return;
                }
                Step::Next(None) => {
                    return match lines.exit_status() {
                        Some(status) if !status.success() => self.finish(
                            RunOutcome::Failed,
                            Some(format!("exit status: {}", status.exit_code())),
                        ),
                        _ => self.finish(RunOutcome::Succeeded, None),
                    };
                }
                Step::Cancel => {
                    match lines.cancel().await {
                        Ok(status) => debug!(command = %self.name, %status, "cancelled run reaped"),
                        Err(e) => warn!(command = %self.name, error = %e, "cancelled run not reaped"),
                    }
                    self.finish(RunOutcome::Cancelled, None);
                    return;
                }
            }
        }
    }

    fn finish(&self, outcome: RunOutcome, diagnostic: Option<String>) {
        let label = outcome.label(&self.name);
        info!(command = %self.name, ?outcome, "run finished");

        let mut state = lock(&self.state);
        if let Some(text) = diagnostic {
            state.append(OutputLine::stderr(text));
        }
        state.running = None;
        state.cancel = None;
        state.status = RunStatus::Finished {
            label: label.clone(),
        };
        state.notify(SessionEvent::Finished {
            command: self.command,
            outcome,
            label,
        });
    }
}
