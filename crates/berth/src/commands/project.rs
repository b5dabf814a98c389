use super::{CliContext, require_project};
use crate::ProjectCommands;
use anyhow::{Context, Result};
use comfy_table::Table;
use project_store::ProjectStore;
use std::path::PathBuf;

pub fn run(ctx: &CliContext, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Add { name, root } => add(ctx, &name, root),
        ProjectCommands::List => list(ctx),
        ProjectCommands::Rm { name } => remove(ctx, &name),
    }
}

fn add(ctx: &CliContext, name: &str, root: Option<PathBuf>) -> Result<()> {
    let root = match root {
        Some(root) => root,
        None => ctx
            .settings
            .project_root()
            .context("Failed to determine the default project root")?,
    };
    let root = std::path::absolute(&root)
        .with_context(|| format!("Invalid project root {}", root.display()))?;

    let store = ctx.open_store()?;
    store.upsert_project(name, &root)?;

    println!("Project '{}' -> {}", name, root.display());
    Ok(())
}

fn list(ctx: &CliContext) -> Result<()> {
    let store = ctx.open_store()?;
    let projects = store.list_projects()?;

    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["PROJECT", "ROOT", "CONTAINERS", "COMMANDS", "UPDATED"]);

    for project in &projects {
        let containers = store.containers_for(project.id)?.len();
        let commands = store.commands_for(project.id, None)?.len();
        table.add_row(vec![
            project.name.clone(),
            project.root.display().to_string(),
            containers.to_string(),
            commands.to_string(),
            project.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn remove(ctx: &CliContext, name: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let project = require_project(&store, name)?;
    store.delete_project(project.id)?;

    println!("Removed project '{}'", name);
    Ok(())
}
