use super::{CliContext, require_container, require_project};
use crate::ContainerCommands;
use anyhow::Result;
use comfy_table::Table;
use project_store::{ProjectStore, ShellKind};

pub fn run(ctx: &CliContext, command: ContainerCommands) -> Result<()> {
    match command {
        ContainerCommands::Add {
            project,
            name,
            shell,
        } => add(ctx, &project, &name, shell),
        ContainerCommands::List { project } => list(ctx, &project),
        ContainerCommands::Rm { project, name } => remove(ctx, &project, &name),
    }
}

fn add(ctx: &CliContext, project: &str, name: &str, shell: Option<ShellKind>) -> Result<()> {
    let shell = shell.unwrap_or(ctx.settings.default_shell);

    let store = ctx.open_store()?;
    let project = require_project(&store, project)?;
    store.upsert_container(project.id, name, shell)?;

    println!("Container '{}' in '{}' uses {}", name, project.name, shell);
    Ok(())
}

fn list(ctx: &CliContext, project: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let project = require_project(&store, project)?;
    let containers = store.containers_for(project.id)?;

    if containers.is_empty() {
        println!("No containers in '{}'", project.name);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["CONTAINER", "SHELL", "COMMANDS"]);
    for container in &containers {
        let commands = store.commands_for(project.id, Some(container.id))?.len();
        table.add_row(vec![
            container.name.clone(),
            container.shell.to_string(),
            commands.to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn remove(ctx: &CliContext, project: &str, name: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let project = require_project(&store, project)?;
    let container = require_container(&store, &project, name)?;
    store.delete_container(container.id)?;

    println!("Removed container '{}' from '{}'", name, project.name);
    Ok(())
}
