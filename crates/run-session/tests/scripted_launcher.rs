//! Session behavior against a launcher that replays canned output

use async_channel::Receiver;
use async_trait::async_trait;
use chrono::Utc;
use command_executor::{Command as Invocation, Error, ExitStatus, Launcher, LineStream, LogSource, OutputLine, Result};
use futures::stream::Stream;
use project_store::{Command, Project};
use run_session::{BoxedTask, RunOutcome, RunSession, SessionEvent, ShellEnvironment, Spawner};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Output a [`Scripted`] launcher replays for its next launch
#[derive(Default)]
struct Script {
    lines: Vec<Result<OutputLine>>,
    status: Option<ExitStatus>,
    spawn_error: Option<Error>,
    hang: bool,
}

#[derive(Default)]
struct Scripted {
    next: Mutex<Option<Script>>,
    launched: Mutex<Vec<Invocation>>,
    cancelled: Arc<AtomicBool>,
}

impl Scripted {
    fn replay(script: Script) -> Self {
        Self {
            next: Mutex::new(Some(script)),
            ..Self::default()
        }
    }
}

struct ScriptedLines {
    items: VecDeque<Result<OutputLine>>,
    status: Option<ExitStatus>,
    exit: Option<ExitStatus>,
    hang: bool,
    cancelled: Arc<AtomicBool>,
}

impl Stream for ScriptedLines {
    type Item = Result<OutputLine>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(item) = this.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        if this.hang {
            return Poll::Pending;
        }
        this.exit = this.status;
        Poll::Ready(None)
    }
}

#[async_trait]
impl LineStream for ScriptedLines {
    fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    async fn cancel(self) -> Result<ExitStatus> {
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(ExitStatus::from_code(143))
    }
}

#[async_trait]
impl Launcher for Scripted {
    type Lines = ScriptedLines;

    async fn launch(&self, command: Invocation) -> Result<ScriptedLines> {
        self.launched.lock().unwrap().push(command);
        let script = self.next.lock().unwrap().take().unwrap_or_default();
        if let Some(e) = script.spawn_error {
            return Err(e);
        }
        Ok(ScriptedLines {
            items: script.lines.into(),
            status: script.status,
            exit: None,
            hang: script.hang,
            cancelled: self.cancelled.clone(),
        })
    }
}

fn project() -> Project {
    let now = Utc::now();
    Project {
        id: 1,
        name: "demo".into(),
        root: PathBuf::from("/srv/demo"),
        created_at: now,
        updated_at: now,
    }
}

fn command(id: u64, name: &str, script: &str) -> Command {
    let now = Utc::now();
    Command {
        id,
        project_id: 1,
        container_id: None,
        name: name.into(),
        script: script.into(),
        created_at: now,
        updated_at: now,
    }
}

fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    smol::block_on(async {
        let mut seen = Vec::new();
        while let Ok(event) = events.recv().await {
            let done = matches!(event, SessionEvent::Finished { .. });
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    })
}

#[test]
fn test_events_follow_state_changes_in_order() {
    let launcher = Scripted::replay(Script {
        lines: vec![Ok(OutputLine::stdout("a")), Ok(OutputLine::stderr("b"))],
        status: Some(ExitStatus::from_code(0)),
        ..Script::default()
    });
    let session = RunSession::new(launcher).with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    assert!(session.start(&project(), &command(10, "hello", "echo hi")));

    assert_eq!(
        drain(&events),
        [
            SessionEvent::Started {
                command: 10,
                label: "Running hello in demo".into(),
            },
            SessionEvent::Line(OutputLine::stdout("a")),
            SessionEvent::Line(OutputLine::stderr("b")),
            SessionEvent::Finished {
                command: 10,
                outcome: RunOutcome::Succeeded,
                label: "Done: hello".into(),
            },
        ]
    );
    assert_eq!(session.current_log(), "a\nb\n");
}

#[test]
fn test_composed_invocation_reaches_launcher() {
    let launcher = Arc::new(Scripted::default());
    let session = RunSession::new(SharedLauncher(launcher.clone()))
        .with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    session.start(&project(), &command(10, "hello", "echo hi"));
    drain(&events);

    let launched = launcher.launched.lock().unwrap();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].get_program(), "/bin/bash");
    assert_eq!(launched[0].get_args()[0], "-c");
    assert_eq!(launched[0].get_args()[1], "cd '/srv/demo' && echo hi");
}

#[test]
fn test_spawn_failure_is_logged_not_raised() {
    let error = Error::spawn_failed("/bin/bash", "No such file or directory");
    let expected = format!("{error}\n");
    let launcher = Scripted::replay(Script {
        spawn_error: Some(error),
        ..Script::default()
    });
    let session = RunSession::new(launcher).with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    session.start(&project(), &command(10, "hello", "echo hi"));
    let seen = drain(&events);

    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Finished {
            outcome: RunOutcome::Failed,
            ..
        })
    ));
    assert_eq!(session.current_log(), expected);
    assert_eq!(session.current_status().label(), Some("Failed: hello"));
    assert!(!session.is_running());
}

#[test]
fn test_stream_error_ends_the_run() {
    let error = Error::stream_failed(7, LogSource::Stdout, "broken pipe");
    let expected = format!("partial\n{error}\n");
    let launcher = Scripted::replay(Script {
        lines: vec![
            Ok(OutputLine::stdout("partial")),
            Err(error),
            Ok(OutputLine::stdout("never seen")),
        ],
        status: Some(ExitStatus::from_code(0)),
        ..Script::default()
    });
    let session = RunSession::new(launcher).with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    session.start(&project(), &command(10, "hello", "echo hi"));
    drain(&events);

    assert_eq!(session.current_log(), expected);
    assert_eq!(session.current_status().label(), Some("Failed: hello"));
}

#[test]
fn test_missing_exit_status_counts_as_done() {
    let launcher = Scripted::replay(Script {
        lines: vec![Ok(OutputLine::stdout("x"))],
        status: None,
        ..Script::default()
    });
    let session = RunSession::new(launcher).with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    session.start(&project(), &command(10, "hello", "echo x"));
    drain(&events);

    assert_eq!(session.current_status().label(), Some("Done: hello"));
}

#[test]
fn test_cancel_stops_a_hanging_stream() {
    let launcher = Arc::new(Scripted::replay(Script {
        lines: vec![Ok(OutputLine::stdout("waiting"))],
        hang: true,
        ..Script::default()
    }));
    let session = RunSession::new(SharedLauncher(launcher.clone()))
        .with_environment(ShellEnvironment::bare());
    let events = session.subscribe();

    session.start(&project(), &command(10, "serve", "sleep 100"));
    smol::block_on(async {
        loop {
            if let Ok(SessionEvent::Line(_)) = events.recv().await {
                break;
            }
        }
    });

    assert!(session.is_running());
    assert!(session.cancel());
    let seen = drain(&events);

    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Finished {
            outcome: RunOutcome::Cancelled,
            ..
        })
    ));
    assert!(launcher.cancelled.load(Ordering::SeqCst));
    assert_eq!(session.current_log(), "waiting\n");
    assert_eq!(session.current_status().label(), Some("Cancelled: serve"));
}

#[test]
fn test_rejected_start_spawns_nothing() {
    let launcher = Scripted::replay(Script {
        hang: true,
        ..Script::default()
    });
    let spawned = Arc::new(AtomicUsize::new(0));
    let session = RunSession::new(launcher)
        .with_environment(ShellEnvironment::bare())
        .with_spawner(Counting(spawned.clone()));
    let events = session.subscribe();

    assert!(session.start(&project(), &command(10, "serve", "sleep 100")));
    assert!(!session.start(&project(), &command(11, "other", "true")));
    assert!(!session.start(&project(), &command(10, "serve", "sleep 100")));
    assert_eq!(spawned.load(Ordering::SeqCst), 1);
    assert_eq!(session.running_command(), Some(10));

    session.cancel();
    drain(&events);
    assert_eq!(session.running_command(), None);
}

/// Lets a test keep a handle on the launcher it gave away
struct SharedLauncher(Arc<Scripted>);

#[async_trait]
impl Launcher for SharedLauncher {
    type Lines = ScriptedLines;

    async fn launch(&self, command: Invocation) -> Result<ScriptedLines> {
        self.0.launch(command).await
    }
}

/// Counts spawned runs, then hands them to smol
struct Counting(Arc<AtomicUsize>);

impl Spawner for Counting {
    fn spawn(&self, future: BoxedTask) {
        self.0.fetch_add(1, Ordering::SeqCst);
        smol::spawn(future).detach();
    }
}
