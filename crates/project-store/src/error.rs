//! Error types for the project store

use sled::transaction::TransactionError;
use thiserror::Error;

/// Project store error type
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced project does not exist
    #[error("Project not found: {0}")]
    ProjectNotFound(u64),

    /// Referenced container does not exist
    #[error("Container not found: {0}")]
    ContainerNotFound(u64),

    /// A command was scoped to a container of a different project
    #[error("Container {container} does not belong to project {project}")]
    ContainerOutsideProject {
        /// Container id given for the command
        container: u64,
        /// Project the command belongs to
        project: u64,
    },

    /// Names must be non-empty
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Stored bytes could not be interpreted
    #[error("Corrupt record in {tree}: {reason}")]
    CorruptRecord {
        /// Tree holding the record
        tree: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Sled(e),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
