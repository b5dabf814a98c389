//! Persistent store for projects, containers and commands
//!
//! A project is a named working directory. Containers are named execution
//! contexts inside a project, each with its own shell, and commands are
//! stored scripts scoped to a project and optionally to one of its
//! containers.
//!
//! The store is a small keyed repository with uniqueness constraints. Records
//! are kept as JSON documents in [`sled`] trees, one secondary index per
//! uniqueness rule.
//!
//! # Example
//!
//! ```no_run
//! use project_store::{ProjectStore, ShellKind, SledStore};
//! use std::path::Path;
//!
//! # fn example() -> project_store::Result<()> {
//! let store = SledStore::open("/tmp/berth/db")?;
//!
//! let project = store.upsert_project("demo", Path::new("/tmp/demo"))?;
//! let web = store.upsert_container(project, "web", ShellKind::Zsh)?;
//! store.upsert_command(project, "serve", "npm run dev", Some(web))?;
//!
//! for command in store.commands_for(project, None)? {
//!     println!("{}: {}", command.name, command.script);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod models;

pub use backend::ProjectStore;
pub use backend::sled::SledStore;
pub use error::{Error, Result};
pub use models::{
    Command, CommandId, Container, ContainerId, Project, ProjectGraph, ProjectId, ShellKind,
    UnknownShell,
};
