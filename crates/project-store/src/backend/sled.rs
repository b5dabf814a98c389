//! Sled database backend for the project store
//!
//! Layout, one tree per concern:
//!
//! | tree             | key                         | value          |
//! |------------------|-----------------------------|----------------|
//! | `projects`       | project id                  | JSON `Project` |
//! | `project_names`  | name                        | project id     |
//! | `containers`     | container id                | JSON `Container` |
//! | `container_keys` | project id ++ name          | container id   |
//! | `commands`       | command id                  | JSON `Command` |
//! | `command_keys`   | project id ++ name          | command id     |
//!
//! Ids are big-endian so that the scoped indexes iterate one project at a
//! time, in name order.

use super::ProjectStore;
use crate::error::{Error, Result};
use crate::models::*;
use chrono::Utc;
use serde::de::DeserializeOwned;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

const PROJECTS: &str = "projects";
const PROJECT_NAMES: &str = "project_names";
const CONTAINERS: &str = "containers";
const CONTAINER_KEYS: &str = "container_keys";
const COMMANDS: &str = "commands";
const COMMAND_KEYS: &str = "command_keys";

/// Sled-based project store
pub struct SledStore {
    /// Database instance
    db: sled::Db,
    projects: sled::Tree,
    project_names: sled::Tree,
    containers: sled::Tree,
    container_keys: sled::Tree,
    commands: sled::Tree,
    command_keys: sled::Tree,
    /// Serializes writers; the index lookups they do before committing must
    /// not interleave
    writes: Mutex<()>,
}

impl SledStore {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening sled database at {:?}", path);
        Self::with_db(sled::open(path)?)
    }

    /// Create a store that is removed when dropped (for testing)
    pub fn temporary() -> Result<Self> {
        info!("Creating temporary sled database");
        Self::with_db(sled::Config::new().temporary(true).open()?)
    }

    fn with_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            projects: db.open_tree(PROJECTS)?,
            project_names: db.open_tree(PROJECT_NAMES)?,
            containers: db.open_tree(CONTAINERS)?,
            container_keys: db.open_tree(CONTAINER_KEYS)?,
            commands: db.open_tree(COMMANDS)?,
            command_keys: db.open_tree(COMMAND_KEYS)?,
            db,
            writes: Mutex::new(()),
        })
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Resolve every entry of a scoped index for one project, in name order
    fn scoped_ids(
        tree: &sled::Tree,
        tree_name: &'static str,
        project: ProjectId,
    ) -> Result<Vec<(sled::IVec, u64)>> {
        let mut entries = Vec::new();
        for result in tree.scan_prefix(project.to_be_bytes()) {
            let (key, value) = result?;
            entries.push((key, decode_id(tree_name, &value)?));
        }
        Ok(entries)
    }

    fn resolve<T: DeserializeOwned>(
        &self,
        records: &sled::Tree,
        tree_name: &'static str,
        ids: impl IntoIterator<Item = u64>,
    ) -> Result<Vec<T>> {
        ids.into_iter()
            .map(|id| {
                load(records, id)?.ok_or_else(|| Error::CorruptRecord {
                    tree: tree_name,
                    reason: format!("index points at missing id {id}"),
                })
            })
            .collect()
    }

    fn require_project(&self, id: ProjectId) -> Result<Project> {
        self.project(id)?.ok_or(Error::ProjectNotFound(id))
    }
}

impl ProjectStore for SledStore {
    fn list_projects(&self) -> Result<Vec<Project>> {
        debug!("Listing all projects");

        let mut ids = Vec::new();
        for result in self.project_names.iter() {
            let (_, value) = result?;
            ids.push(decode_id(PROJECT_NAMES, &value)?);
        }
        self.resolve(&self.projects, PROJECTS, ids)
    }

    fn fetch_project(&self, name: &str) -> Result<Option<Project>> {
        match self.project_names.get(name.as_bytes())? {
            Some(id) => self.project(decode_id(PROJECT_NAMES, &id)?),
            None => Ok(None),
        }
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        load(&self.projects, id)
    }

    fn containers_for(&self, project: ProjectId) -> Result<Vec<Container>> {
        debug!(project, "Listing containers");

        let ids = Self::scoped_ids(&self.container_keys, CONTAINER_KEYS, project)?;
        self.resolve(&self.containers, CONTAINERS, ids.into_iter().map(|(_, id)| id))
    }

    fn container(&self, id: ContainerId) -> Result<Option<Container>> {
        load(&self.containers, id)
    }

    fn fetch_container(&self, project: ProjectId, name: &str) -> Result<Option<Container>> {
        match self.container_keys.get(scoped_key(project, name))? {
            Some(id) => self.container(decode_id(CONTAINER_KEYS, &id)?),
            None => Ok(None),
        }
    }

    fn commands_for(
        &self,
        project: ProjectId,
        container: Option<ContainerId>,
    ) -> Result<Vec<Command>> {
        debug!(project, ?container, "Listing commands");

        let ids = Self::scoped_ids(&self.command_keys, COMMAND_KEYS, project)?;
        let commands: Vec<Command> =
            self.resolve(&self.commands, COMMANDS, ids.into_iter().map(|(_, id)| id))?;

        Ok(match container {
            Some(container) => commands
                .into_iter()
                .filter(|c| c.container_id == Some(container))
                .collect(),
            None => commands,
        })
    }

    fn command(&self, id: CommandId) -> Result<Option<Command>> {
        load(&self.commands, id)
    }

    fn fetch_command(&self, project: ProjectId, name: &str) -> Result<Option<Command>> {
        match self.command_keys.get(scoped_key(project, name))? {
            Some(id) => self.command(decode_id(COMMAND_KEYS, &id)?),
            None => Ok(None),
        }
    }

    fn upsert_project(&self, name: &str, root: &Path) -> Result<ProjectId> {
        validate_name(name)?;
        let _guard = self.write_lock();
        let now = Utc::now();

        let project = match self.fetch_project(name)? {
            Some(existing) => Project {
                root: root.to_path_buf(),
                updated_at: now,
                ..existing
            },
            None => Project {
                id: self.next_id()?,
                name: name.to_string(),
                root: root.to_path_buf(),
                created_at: now,
                updated_at: now,
            },
        };

        let key = project.id.to_be_bytes();
        let value = serde_json::to_vec(&project)?;
        (&self.projects, &self.project_names).transaction(
            |(projects, names)| -> ConflictableTransactionResult<(), Error> {
                projects.insert(&key[..], value.as_slice())?;
                names.insert(name.as_bytes(), &key[..])?;
                Ok(())
            },
        )?;
        self.flush()?;

        debug!(id = project.id, name, root = ?project.root, "Stored project");
        Ok(project.id)
    }

    fn upsert_container(
        &self,
        project: ProjectId,
        name: &str,
        shell: ShellKind,
    ) -> Result<ContainerId> {
        validate_name(name)?;
        let _guard = self.write_lock();
        self.require_project(project)?;
        let now = Utc::now();

        let container = match self.fetch_container(project, name)? {
            Some(existing) => Container {
                shell,
                updated_at: now,
                ..existing
            },
            None => Container {
                id: self.next_id()?,
                project_id: project,
                name: name.to_string(),
                shell,
                created_at: now,
                updated_at: now,
            },
        };

        let key = container.id.to_be_bytes();
        let scoped = scoped_key(project, name);
        let value = serde_json::to_vec(&container)?;
        (&self.containers, &self.container_keys).transaction(
            |(containers, keys)| -> ConflictableTransactionResult<(), Error> {
                containers.insert(&key[..], value.as_slice())?;
                keys.insert(scoped.as_slice(), &key[..])?;
                Ok(())
            },
        )?;
        self.flush()?;

        debug!(id = container.id, project, name, %shell, "Stored container");
        Ok(container.id)
    }

    fn upsert_command(
        &self,
        project: ProjectId,
        name: &str,
        script: &str,
        container: Option<ContainerId>,
    ) -> Result<CommandId> {
        validate_name(name)?;
        let _guard = self.write_lock();
        self.require_project(project)?;

        if let Some(container_id) = container {
            let scope = self
                .container(container_id)?
                .ok_or(Error::ContainerNotFound(container_id))?;
            if scope.project_id != project {
                return Err(Error::ContainerOutsideProject {
                    container: container_id,
                    project,
                });
            }
        }

        let now = Utc::now();
        let command = match self.fetch_command(project, name)? {
            Some(existing) => Command {
                container_id: container,
                script: script.to_string(),
                updated_at: now,
                ..existing
            },
            None => Command {
                id: self.next_id()?,
                project_id: project,
                container_id: container,
                name: name.to_string(),
                script: script.to_string(),
                created_at: now,
                updated_at: now,
            },
        };

        let key = command.id.to_be_bytes();
        let scoped = scoped_key(project, name);
        let value = serde_json::to_vec(&command)?;
        (&self.commands, &self.command_keys).transaction(
            |(commands, keys)| -> ConflictableTransactionResult<(), Error> {
                commands.insert(&key[..], value.as_slice())?;
                keys.insert(scoped.as_slice(), &key[..])?;
                Ok(())
            },
        )?;
        self.flush()?;

        debug!(id = command.id, project, name, ?container, "Stored command");
        Ok(command.id)
    }

    fn delete_project(&self, id: ProjectId) -> Result<()> {
        let _guard = self.write_lock();
        let Some(project) = self.project(id)? else {
            debug!(id, "Project already absent");
            return Ok(());
        };

        let containers = Self::scoped_ids(&self.container_keys, CONTAINER_KEYS, id)?;
        let commands = Self::scoped_ids(&self.command_keys, COMMAND_KEYS, id)?;
        let key = id.to_be_bytes();

        (
            &self.projects,
            &self.project_names,
            &self.containers,
            &self.container_keys,
            &self.commands,
            &self.command_keys,
        )
            .transaction(
                |(projects, names, container_tree, container_keys, command_tree, command_keys)|
                 -> ConflictableTransactionResult<(), Error> {
                    for (scoped, container_id) in &containers {
                        container_tree.remove(&container_id.to_be_bytes()[..])?;
                        container_keys.remove(scoped.clone())?;
                    }
                    for (scoped, command_id) in &commands {
                        command_tree.remove(&command_id.to_be_bytes()[..])?;
                        command_keys.remove(scoped.clone())?;
                    }
                    projects.remove(&key[..])?;
                    names.remove(project.name.as_bytes())?;
                    Ok(())
                },
            )?;
        self.flush()?;

        info!(
            id,
            name = %project.name,
            containers = containers.len(),
            commands = commands.len(),
            "Deleted project"
        );
        Ok(())
    }

    fn delete_container(&self, id: ContainerId) -> Result<()> {
        let _guard = self.write_lock();
        let Some(container) = self.container(id)? else {
            debug!(id, "Container already absent");
            return Ok(());
        };

        // Scoped commands survive, unscoped; updated_at is left alone
        let orphans = self
            .commands_for(container.project_id, Some(id))?
            .into_iter()
            .map(|mut command| -> Result<(CommandId, Vec<u8>)> {
                command.container_id = None;
                Ok((command.id, serde_json::to_vec(&command)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let key = id.to_be_bytes();
        let scoped = scoped_key(container.project_id, &container.name);
        (&self.containers, &self.container_keys, &self.commands).transaction(
            |(containers, keys, commands)| -> ConflictableTransactionResult<(), Error> {
                containers.remove(&key[..])?;
                keys.remove(scoped.as_slice())?;
                for (command_id, value) in &orphans {
                    commands.insert(&command_id.to_be_bytes()[..], value.as_slice())?;
                }
                Ok(())
            },
        )?;
        self.flush()?;

        info!(id, name = %container.name, unscoped = orphans.len(), "Deleted container");
        Ok(())
    }

    fn delete_command(&self, id: CommandId) -> Result<()> {
        let _guard = self.write_lock();
        let Some(command) = self.command(id)? else {
            debug!(id, "Command already absent");
            return Ok(());
        };

        let key = id.to_be_bytes();
        let scoped = scoped_key(command.project_id, &command.name);
        (&self.commands, &self.command_keys).transaction(
            |(commands, keys)| -> ConflictableTransactionResult<(), Error> {
                commands.remove(&key[..])?;
                keys.remove(scoped.as_slice())?;
                Ok(())
            },
        )?;
        self.flush()?;

        debug!(id, name = %command.name, "Deleted command");
        Ok(())
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        // Attempt to flush on drop
        if let Err(e) = self.db.flush() {
            error!("Failed to flush database on drop: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn scoped_key(project: ProjectId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + name.len());
    key.extend_from_slice(&project.to_be_bytes());
    key.extend_from_slice(name.as_bytes());
    key
}

fn decode_id(tree: &'static str, bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| Error::CorruptRecord {
        tree,
        reason: format!("id has {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn load<T: DeserializeOwned>(tree: &sled::Tree, id: u64) -> Result<Option<T>> {
    match tree.get(id.to_be_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
