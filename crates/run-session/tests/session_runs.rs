//! End-to-end runs through a real shell

#![cfg(unix)]

use async_channel::Receiver;
use futures_lite::future;
use project_store::{Command, Project, ProjectStore, ShellKind, SledStore};
use run_session::{RunOutcome, RunSession, RunStatus, SessionEvent, ShellEnvironment};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(20);

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    store: SledStore,
    project: Project,
}

impl Fixture {
    fn new() -> Self {
        Self::with_root_name("demo")
    }

    fn with_root_name(name: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(name);
        std::fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let store = SledStore::temporary().unwrap();
        let id = store.upsert_project("demo", &root).unwrap();
        let project = store.project(id).unwrap().unwrap();

        Self {
            _dir: dir,
            root,
            store,
            project,
        }
    }

    fn command(&self, name: &str, script: &str) -> Command {
        let id = self
            .store
            .upsert_command(self.project.id, name, script, None)
            .unwrap();
        self.store.command(id).unwrap().unwrap()
    }
}

fn session() -> RunSession {
    RunSession::default()
        .with_environment(ShellEnvironment::bare())
        .with_default_shell(ShellKind::Sh)
}

fn wait_finished(events: &Receiver<SessionEvent>) -> (RunOutcome, String) {
    smol::block_on(async {
        let finished = async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Finished { outcome, label, .. }) => {
                        return Some((outcome, label));
                    }
                    Ok(_) => continue,
                    Err(_) => return None,
                }
            }
        };
        let expired = async {
            smol::Timer::after(DEADLINE).await;
            None
        };
        future::or(finished, expired)
            .await
            .expect("run did not finish in time")
    })
}

fn wait_line(events: &Receiver<SessionEvent>, text: &str) {
    smol::block_on(async {
        let seen = async {
            while let Ok(event) = events.recv().await {
                if matches!(&event, SessionEvent::Line(line) if line.text == text) {
                    return true;
                }
            }
            false
        };
        let expired = async {
            smol::Timer::after(DEADLINE).await;
            false
        };
        assert!(future::or(seen, expired).await, "never saw line {text:?}");
    })
}

#[test]
fn test_echo_hi_scenario() {
    let fx = Fixture::new();
    let hello = fx.command("hello", "echo hi");
    let session = session();
    let events = session.subscribe();

    assert!(session.start(&fx.project, &hello));
    let (outcome, label) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(label, "Done: hello");
    assert_eq!(session.current_log(), "hi\n");
    assert_eq!(
        session.current_status(),
        RunStatus::Finished {
            label: "Done: hello".into()
        }
    );
    assert!(!session.is_running());
    assert_eq!(session.running_command(), None);
}

#[test]
fn test_running_label_and_started_event() {
    let fx = Fixture::new();
    let hello = fx.command("hello", "echo hi");
    let session = session();
    let events = session.subscribe();

    session.start(&fx.project, &hello);

    let first = smol::block_on(events.recv()).unwrap();
    assert_eq!(
        first,
        SessionEvent::Started {
            command: hello.id,
            label: "Running hello in demo".into(),
        }
    );
    wait_finished(&events);
}

#[test]
fn test_non_zero_exit_is_reported() {
    let fx = Fixture::new();
    let broken = fx.command("broken", "exit 7");
    let session = session();
    let events = session.subscribe();

    session.start(&fx.project, &broken);
    let (outcome, label) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(label, "Failed: broken");
    assert_eq!(session.current_log(), "exit status: 7\n");
}

#[test]
fn test_start_is_refused_while_running() {
    let fx = Fixture::new();
    let slow = fx.command("slow", "echo started; sleep 30");
    let quick = fx.command("quick", "echo quick");
    let session = session();
    let events = session.subscribe();

    assert!(session.start(&fx.project, &slow));
    wait_line(&events, "started");

    let log = session.current_log();
    let status = session.current_status();
    let running = session.running_command();

    assert!(!session.start(&fx.project, &quick));

    assert_eq!(session.current_log(), log);
    assert_eq!(session.current_status(), status);
    assert_eq!(session.running_command(), running);
    assert_eq!(running, Some(slow.id));

    assert!(session.cancel());
    let (outcome, label) = wait_finished(&events);
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(label, "Cancelled: slow");
    assert_eq!(session.current_log(), "started\n");
    assert!(!session.cancel());

    // Finished is idle: the slot is free again
    assert!(session.start(&fx.project, &quick));
    let (outcome, _) = wait_finished(&events);
    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), "quick\n");
}

#[test]
fn test_background_job_does_not_hold_the_run_open() {
    let fx = Fixture::new();
    let serve = fx.command("serve", "sleep 30 & echo $! > sleeper.pid; echo hi");
    let quick = fx.command("quick", "echo quick");
    let session = session();
    let events = session.subscribe();

    let started = std::time::Instant::now();
    assert!(session.start(&fx.project, &serve));
    let (outcome, label) = wait_finished(&events);

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(label, "Done: serve");
    assert_eq!(session.current_log(), "hi\n");
    assert!(!session.is_running());

    assert!(session.start(&fx.project, &quick));
    let (outcome, _) = wait_finished(&events);
    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), "quick\n");

    let sleeper = std::fs::read_to_string(fx.root.join("sleeper.pid")).unwrap();
    let _ = std::process::Command::new("kill")
        .args(["-9", sleeper.trim()])
        .status();
}

#[test]
fn test_root_with_single_quote_is_escaped() {
    let fx = Fixture::with_root_name("a'b proj");
    let pwd = fx.command("where", "pwd");
    let session = session();
    let events = session.subscribe();

    session.start(&fx.project, &pwd);
    let (outcome, _) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), format!("{}\n", fx.root.display()));
}

#[test]
fn test_unscoped_command_runs_at_root_after_container_delete() {
    let fx = Fixture::new();
    let web = fx
        .store
        .upsert_container(fx.project.id, "web", ShellKind::Sh)
        .unwrap();
    let id = fx
        .store
        .upsert_command(fx.project.id, "where", "pwd", Some(web))
        .unwrap();

    fx.store.delete_container(web).unwrap();

    let graph = fx.store.load_project_graph("demo").unwrap().unwrap();
    let command = graph.command("where").unwrap().clone();
    assert_eq!(command.id, id);
    assert_eq!(command.container_id, None);

    let session = session();
    let events = session.subscribe();
    assert!(session.start_scoped(&graph, &command));
    let (outcome, _) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), format!("{}\n", fx.root.display()));
}

#[test]
fn test_scoped_command_uses_container_shell() {
    if !Path::new("/bin/bash").exists() {
        return;
    }
    let fx = Fixture::new();
    let web = fx
        .store
        .upsert_container(fx.project.id, "web", ShellKind::Bash)
        .unwrap();
    fx.store
        .upsert_command(
            fx.project.id,
            "which",
            r#"[ -n "$BASH_VERSION" ] && echo bash || echo other"#,
            Some(web),
        )
        .unwrap();

    let graph = fx.store.load_project_graph("demo").unwrap().unwrap();
    let command = graph.command("which").unwrap().clone();

    let session = session();
    let events = session.subscribe();
    session.start_scoped(&graph, &command);
    wait_finished(&events);

    assert_eq!(session.current_log(), "bash\n");
}

#[test]
fn test_missing_root_fails_with_exit_status() {
    let fx = Fixture::new();
    let gone = fx
        .store
        .upsert_project("gone", &fx.root.join("does-not-exist"))
        .unwrap();
    let project = fx.store.project(gone).unwrap().unwrap();
    let id = fx.store.upsert_command(gone, "hello", "echo hi", None).unwrap();
    let hello = fx.store.command(id).unwrap().unwrap();

    let session = session();
    let events = session.subscribe();
    session.start(&project, &hello);
    let (outcome, label) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(label, "Failed: hello");
    let log = session.current_log();
    assert!(!log.contains("hi\n"));
    assert!(log.lines().last().unwrap().starts_with("exit status: "));
}

#[test]
fn test_empty_script_is_left_to_the_shell() {
    let fx = Fixture::new();
    let empty = fx.command("empty", "");
    let session = session();
    let events = session.subscribe();

    session.start(&fx.project, &empty);
    let (outcome, _) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Failed);
    let log = session.current_log();
    assert!(log.lines().last().unwrap().starts_with("exit status: "));
}

#[test]
fn test_stdout_and_stderr_both_logged() {
    let fx = Fixture::new();
    let both = fx.command("both", "echo out; echo err >&2");
    let session = session();
    let events = session.subscribe();

    session.start(&fx.project, &both);

    let mut tagged = Vec::new();
    smol::block_on(async {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Line(line) => tagged.push((line.is_stderr(), line.text)),
                SessionEvent::Finished { .. } => break,
                SessionEvent::Started { .. } => {}
            }
        }
    });
    tagged.sort();

    assert_eq!(
        tagged,
        [(false, "out".to_string()), (true, "err".to_string())]
    );
    let mut logged: Vec<_> = session.current_log().lines().map(str::to_string).collect();
    logged.sort();
    assert_eq!(logged, ["err", "out"]);
}

#[test]
fn test_profiles_are_sourced_best_effort() {
    let fx = Fixture::new();
    let home = TempDir::new().unwrap();
    // The profile sets a variable and then fails; the run must still go on
    std::fs::write(
        home.path().join(".profile"),
        "BERTH_MARK=from-profile\nexport BERTH_MARK\nfalse\n",
    )
    .unwrap();

    let show = fx.command("show", r#"echo "$BERTH_MARK""#);
    let session = RunSession::default()
        .with_default_shell(ShellKind::Sh)
        .with_environment(ShellEnvironment {
            path_prefix: Vec::new(),
            source_profiles: true,
            home: Some(home.path().to_path_buf()),
        });
    let events = session.subscribe();

    session.start(&fx.project, &show);
    let (outcome, _) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), "from-profile\n");
}

#[test]
fn test_path_prefix_is_searched_first() {
    let fx = Fixture::new();
    let tools = TempDir::new().unwrap();
    std::os::unix::fs::symlink("/bin/echo", tools.path().join("berth-tool")).unwrap();

    let run = fx.command("tool", "berth-tool tool found");
    let session = RunSession::default()
        .with_default_shell(ShellKind::Sh)
        .with_environment(ShellEnvironment {
            path_prefix: vec![tools.path().to_string_lossy().into_owned()],
            source_profiles: false,
            home: None,
        });
    let events = session.subscribe();

    session.start(&fx.project, &run);
    let (outcome, _) = wait_finished(&events);

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(session.current_log(), "tool found\n");
}
