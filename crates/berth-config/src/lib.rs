//! # Berth Configuration
//!
//! User settings for berth, stored as YAML.
//!
//! A missing settings file is not an error: every field has a default, and
//! a file only needs to name the fields it changes.
//!
//! ```yaml
//! default_shell: zsh
//! path_prefix:
//!   - /opt/homebrew/bin
//! termination_grace_ms: 5000
//! ```

#![warn(missing_docs)]

use command_executor::StreamingExecutor;
use project_store::ShellKind;
use run_session::{DEFAULT_PATH_PREFIX, ShellEnvironment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod parser;

pub use parser::{default_config_path, default_data_dir, load, parse_str, save};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the settings file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Default SIGTERM to SIGKILL grace, in milliseconds
pub const DEFAULT_TERMINATION_GRACE_MS: u64 = 2000;

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shell for commands that are not scoped to a container
    pub default_shell: ShellKind,

    /// Root for new projects when none is given; the current directory if
    /// unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_project_root: Option<PathBuf>,

    /// Directories prepended to `PATH` before every run
    pub path_prefix: Vec<String>,

    /// Source the shell's profile files before every run
    pub source_profiles: bool,

    /// How long a cancelled run may take to exit before it is killed
    pub termination_grace_ms: u64,

    /// Where the project database lives; the platform data directory if
    /// unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_shell: ShellKind::default(),
            default_project_root: None,
            path_prefix: DEFAULT_PATH_PREFIX.iter().map(|d| d.to_string()).collect(),
            source_profiles: true,
            termination_grace_ms: DEFAULT_TERMINATION_GRACE_MS,
            data_dir: None,
        }
    }
}

impl Settings {
    /// Grace period between SIGTERM and SIGKILL
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(default_data_dir)
    }

    /// Path of the project database inside the data directory
    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir().map(|dir| dir.join("projects.db"))
    }

    /// Root for a new project when the user gives none
    pub fn project_root(&self) -> std::io::Result<PathBuf> {
        match &self.default_project_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir(),
        }
    }

    /// Environment bootstrap for runs
    pub fn shell_environment(&self) -> ShellEnvironment {
        ShellEnvironment {
            path_prefix: self.path_prefix.clone(),
            source_profiles: self.source_profiles,
            ..ShellEnvironment::default()
        }
    }

    /// Streaming executor honoring the configured grace period
    pub fn executor(&self) -> StreamingExecutor {
        StreamingExecutor::new().with_termination_grace(self.termination_grace())
    }
}
