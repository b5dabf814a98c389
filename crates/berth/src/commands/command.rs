use super::{CliContext, require_container, require_project};
use crate::CommandCommands;
use anyhow::{Context, Result, bail};
use comfy_table::Table;
use futures_lite::future;
use project_store::ProjectStore;
use run_session::{RunOutcome, RunSession, SessionEvent};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Exit code after a run was cancelled, as a shell reports SIGINT
const CANCELLED_EXIT: u8 = 130;

pub fn run(ctx: &CliContext, command: CommandCommands) -> Result<ExitCode> {
    match command {
        CommandCommands::Add {
            project,
            name,
            script,
            container,
        } => add(ctx, &project, &name, &script, container.as_deref())?,
        CommandCommands::List { project, container } => list(ctx, &project, container.as_deref())?,
        CommandCommands::Rm { project, name } => remove(ctx, &project, &name)?,
        CommandCommands::Run {
            project,
            name,
            timeout,
        } => return execute(ctx, &project, &name, timeout.map(Duration::from_secs)),
    }
    Ok(ExitCode::SUCCESS)
}

fn add(
    ctx: &CliContext,
    project: &str,
    name: &str,
    script: &str,
    container: Option<&str>,
) -> Result<()> {
    let store = ctx.open_store()?;
    let project = require_project(&store, project)?;
    let container = container
        .map(|c| require_container(&store, &project, c))
        .transpose()?;

    store.upsert_command(project.id, name, script, container.as_ref().map(|c| c.id))?;

    match container {
        Some(container) => println!(
            "Command '{}' saved in '{}' (container '{}')",
            name, project.name, container.name
        ),
        None => println!("Command '{}' saved in '{}'", name, project.name),
    }
    Ok(())
}

fn list(ctx: &CliContext, project: &str, container: Option<&str>) -> Result<()> {
    let store = ctx.open_store()?;
    let graph = store
        .load_project_graph(project)?
        .with_context(|| format!("Unknown project '{project}'"))?;
    let scope = container
        .map(|c| require_container(&store, &graph.project, c))
        .transpose()?;

    let commands: Vec<_> = graph
        .commands
        .iter()
        .filter(|c| scope.as_ref().is_none_or(|s| c.container_id == Some(s.id)))
        .collect();

    if commands.is_empty() {
        println!("No commands in '{}'", graph.project.name);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["COMMAND", "CONTAINER", "SHELL", "SCRIPT"]);
    for command in commands {
        let container = command.container_id.and_then(|id| graph.container(id));
        let shell = container.map_or(ctx.settings.default_shell, |c| c.shell);
        table.add_row(vec![
            command.name.clone(),
            container.map_or_else(|| "-".to_string(), |c| c.name.clone()),
            shell.to_string(),
            command.script.clone(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn remove(ctx: &CliContext, project: &str, name: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let project = require_project(&store, project)?;
    let command = store
        .fetch_command(project.id, name)?
        .with_context(|| format!("Unknown command '{}' in project '{}'", name, project.name))?;
    store.delete_command(command.id)?;

    println!("Removed command '{}' from '{}'", name, project.name);
    Ok(())
}

fn execute(
    ctx: &CliContext,
    project: &str,
    name: &str,
    timeout: Option<Duration>,
) -> Result<ExitCode> {
    let graph = {
        // Release the database before the run; scripts may call berth themselves
        let store = ctx.open_store()?;
        store
            .load_project_graph(project)?
            .with_context(|| format!("Unknown project '{project}'"))?
    };
    let command = graph
        .command(name)
        .cloned()
        .with_context(|| format!("Unknown command '{}' in project '{}'", name, project))?;

    let session = RunSession::new(ctx.settings.executor())
        .with_environment(ctx.settings.shell_environment())
        .with_default_shell(ctx.settings.default_shell);
    let events = session.subscribe();

    let signals = forward_signals(&session)?;

    if !session.start_scoped(&graph, &command) {
        bail!("A run is already in progress");
    }

    let outcome = smol::block_on(async {
        let follow = async {
            let mut output_closed = false;
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::Started { label, .. } => debug!("{}", label),
                    SessionEvent::Line(_) if output_closed => {}
                    SessionEvent::Line(line) => {
                        let written = if line.is_stderr() {
                            writeln!(io::stderr().lock(), "{}", line.text)
                        } else {
                            writeln!(io::stdout().lock(), "{}", line.text)
                        };
                        if let Err(e) = written {
                            warn!(error = %e, "output closed, cancelling run");
                            output_closed = true;
                            session.cancel();
                        }
                    }
                    SessionEvent::Finished { outcome, label, .. } => {
                        let _ = writeln!(io::stderr().lock(), "{}", label);
                        return Ok(outcome);
                    }
                }
            }
            bail!("Run ended without reporting an outcome")
        };
        let watchdog = async {
            if let Some(limit) = timeout {
                smol::Timer::after(limit).await;
                warn!(command = %command.name, ?limit, "timeout reached, cancelling run");
                session.cancel();
            }
            future::pending().await
        };
        future::or(follow, watchdog).await
    });

    signals.close();

    Ok(match outcome? {
        RunOutcome::Succeeded => ExitCode::SUCCESS,
        RunOutcome::Failed => ExitCode::FAILURE,
        RunOutcome::Cancelled => ExitCode::from(CANCELLED_EXIT),
    })
}

/// Turn SIGINT and SIGTERM into a cancellation of the active run
fn forward_signals(session: &RunSession) -> Result<signal_hook::iterator::Handle> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;
    let handle = signals.handle();
    let session = session.clone();

    std::thread::spawn(move || {
        for signal in signals.forever() {
            warn!(signal, "received signal, cancelling run");
            session.cancel();
        }
    });

    Ok(handle)
}
