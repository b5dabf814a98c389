//! Data models for the project store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Project identifier
pub type ProjectId = u64;
/// Container identifier
pub type ContainerId = u64;
/// Command identifier
pub type CommandId = u64;

/// A named working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque identifier
    pub id: ProjectId,

    /// Unique among projects
    pub name: String,

    /// Directory commands of this project run in
    pub root: PathBuf,

    /// When the project was first stored
    pub created_at: DateTime<Utc>,

    /// Last upsert that touched the project
    pub updated_at: DateTime<Utc>,
}

/// A named execution context inside a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Opaque identifier
    pub id: ContainerId,

    /// Owning project
    pub project_id: ProjectId,

    /// Unique within the owning project
    pub name: String,

    /// Shell commands scoped to this container run under
    pub shell: ShellKind,

    /// When the container was first stored
    pub created_at: DateTime<Utc>,

    /// Last upsert that touched the container
    pub updated_at: DateTime<Utc>,
}

/// A stored script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Opaque identifier
    pub id: CommandId,

    /// Owning project
    pub project_id: ProjectId,

    /// Container the command is scoped to. `None` runs it at the project
    /// root outside any container.
    pub container_id: Option<ContainerId>,

    /// Unique within the owning project
    pub name: String,

    /// Script body, handed to the shell verbatim
    pub script: String,

    /// When the command was first stored
    pub created_at: DateTime<Utc>,

    /// Last upsert that touched the command
    pub updated_at: DateTime<Utc>,
}

/// A project together with everything it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGraph {
    /// The project itself
    pub project: Project,
    /// Containers ordered by name
    pub containers: Vec<Container>,
    /// Commands ordered by name
    pub commands: Vec<Command>,
}

impl ProjectGraph {
    /// Look up a container of this project by id
    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    /// Look up a command of this project by name
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// Shells a container can run its commands under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// GNU bash
    #[default]
    Bash,
    /// Z shell
    Zsh,
    /// POSIX sh
    Sh,
}

impl ShellKind {
    /// Every supported shell
    pub const ALL: [ShellKind; 3] = [ShellKind::Bash, ShellKind::Zsh, ShellKind::Sh];

    /// Lowercase name, as stored and accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Sh => "sh",
        }
    }

    /// Absolute path of the interpreter
    pub fn interpreter(&self) -> &'static str {
        match self {
            ShellKind::Bash => "/bin/bash",
            ShellKind::Zsh => "/bin/zsh",
            ShellKind::Sh => "/bin/sh",
        }
    }

    /// Login and interactive profile files, relative to the home directory
    pub fn profile_files(&self) -> &'static [&'static str] {
        match self {
            ShellKind::Bash => &[".bash_profile", ".bashrc"],
            ShellKind::Zsh => &[".zprofile", ".zshrc"],
            ShellKind::Sh => &[".profile"],
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a shell name fails
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown shell '{0}', expected one of: bash, zsh, sh")]
pub struct UnknownShell(pub String);

impl FromStr for ShellKind {
    type Err = UnknownShell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShellKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownShell(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_kind_parse() {
        assert_eq!("zsh".parse::<ShellKind>().unwrap(), ShellKind::Zsh);
        assert_eq!(" BASH ".parse::<ShellKind>().unwrap(), ShellKind::Bash);
        assert_eq!(
            "fish".parse::<ShellKind>().unwrap_err(),
            UnknownShell("fish".to_string())
        );
    }

    #[test]
    fn test_shell_kind_serde() {
        let json = serde_json::to_string(&ShellKind::Sh).unwrap();
        assert_eq!(json, "\"sh\"");
        let back: ShellKind = serde_json::from_str("\"zsh\"").unwrap();
        assert_eq!(back, ShellKind::Zsh);
    }

    #[test]
    fn test_profile_files() {
        assert_eq!(ShellKind::Zsh.profile_files(), &[".zprofile", ".zshrc"]);
        assert_eq!(ShellKind::Sh.interpreter(), "/bin/sh");
    }
}
