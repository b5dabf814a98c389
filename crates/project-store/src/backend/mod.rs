//! Store backends

pub mod sled;

use crate::{error::Result, models::*};
use std::path::Path;

/// Keyed repository of projects, containers and commands.
///
/// Every call is one logical read or write and is synchronous from the
/// caller's side. Upserts insert when the unique key is absent, otherwise
/// they update the mutable fields and refresh `updated_at`. Deletes take an
/// id and succeed quietly when it is unknown.
pub trait ProjectStore: Send + Sync {
    /// All projects, ordered by name
    fn list_projects(&self) -> Result<Vec<Project>>;

    /// Look up a project by its unique name
    fn fetch_project(&self, name: &str) -> Result<Option<Project>>;

    /// Look up a project by id
    fn project(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Containers of a project, ordered by name
    fn containers_for(&self, project: ProjectId) -> Result<Vec<Container>>;

    /// Look up a container by id
    fn container(&self, id: ContainerId) -> Result<Option<Container>>;

    /// Look up a container of a project by name
    fn fetch_container(&self, project: ProjectId, name: &str) -> Result<Option<Container>>;

    /// Commands of a project ordered by name. With `Some(container)` only
    /// the commands scoped to that container are returned.
    fn commands_for(
        &self,
        project: ProjectId,
        container: Option<ContainerId>,
    ) -> Result<Vec<Command>>;

    /// Look up a command by id
    fn command(&self, id: CommandId) -> Result<Option<Command>>;

    /// Look up a command of a project by name
    fn fetch_command(&self, project: ProjectId, name: &str) -> Result<Option<Command>>;

    /// Insert or update the project called `name`
    fn upsert_project(&self, name: &str, root: &Path) -> Result<ProjectId>;

    /// Insert or update the container `name` of `project`
    fn upsert_container(&self, project: ProjectId, name: &str, shell: ShellKind)
    -> Result<ContainerId>;

    /// Insert or update the command `name` of `project`.
    ///
    /// A container, when given, must belong to the same project.
    fn upsert_command(
        &self,
        project: ProjectId,
        name: &str,
        script: &str,
        container: Option<ContainerId>,
    ) -> Result<CommandId>;

    /// Delete a project together with its containers and commands
    fn delete_project(&self, id: ProjectId) -> Result<()>;

    /// Delete a container. Commands scoped to it are kept and become
    /// unscoped.
    fn delete_container(&self, id: ContainerId) -> Result<()>;

    /// Delete a command
    fn delete_command(&self, id: CommandId) -> Result<()>;

    /// Load a project by name with all of its containers and commands
    fn load_project_graph(&self, name: &str) -> Result<Option<ProjectGraph>> {
        let Some(project) = self.fetch_project(name)? else {
            return Ok(None);
        };
        let containers = self.containers_for(project.id)?;
        let commands = self.commands_for(project.id, None)?;
        Ok(Some(ProjectGraph {
            project,
            containers,
            commands,
        }))
    }
}
