//! Subcommand implementations

pub mod command;
pub mod config;
pub mod container;
pub mod project;

use anyhow::{Context, Result};
use berth_config::{Settings, default_config_path};
use project_store::{Container, Project, ProjectStore, SledStore};
use std::path::PathBuf;
use tracing::debug;

/// Settings and locations resolved from the global flags
pub struct CliContext {
    pub settings: Settings,
    pub config_path: PathBuf,
    data_dir: Option<PathBuf>,
}

impl CliContext {
    pub fn load(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = match config {
            Some(path) => path,
            None => default_config_path()
                .context("No configuration directory on this platform, pass --config")?,
        };
        let settings = berth_config::load(&config_path)
            .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

        Ok(Self {
            settings,
            config_path,
            data_dir,
        })
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.join("projects.db")),
            None => self
                .settings
                .database_path()
                .context("No data directory on this platform, pass --data-dir"),
        }
    }

    pub fn open_store(&self) -> Result<SledStore> {
        let path = self.database_path()?;
        debug!(?path, "opening project store");
        SledStore::open(&path)
            .with_context(|| format!("Failed to open project store at {}", path.display()))
    }
}

pub fn require_project(store: &impl ProjectStore, name: &str) -> Result<Project> {
    store
        .fetch_project(name)?
        .with_context(|| format!("Unknown project '{name}'"))
}

pub fn require_container(
    store: &impl ProjectStore,
    project: &Project,
    name: &str,
) -> Result<Container> {
    store
        .fetch_container(project.id, name)?
        .with_context(|| format!("Unknown container '{}' in project '{}'", name, project.name))
}
