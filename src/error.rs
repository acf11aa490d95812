//! Error types for durq.

use thiserror::Error;

use crate::model::TaskId;

#[derive(Debug, Error)]
pub enum Error {
    /// A stored payload could not be turned back into a live task.
    #[error("cannot reconstruct {type_tag} record {id}: {source}")]
    Reconstruction {
        id: TaskId,
        type_tag: String,
        #[source]
        source: ReconstructionError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("storage migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("identifier already in use: {0}")]
    DuplicateIdentifier(TaskId),

    #[error("no task type registered for tag {0:?}")]
    UnregisteredType(String),

    #[error("queue has not completed recovery")]
    RecoveryPending,

    #[error("recovery has already run")]
    AlreadyRecovered,

    #[error("queue is shut down")]
    ShutDown,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures of the durable store itself.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Migration(_) | Error::Backend(_)
        )
    }
}

/// Why a payload could not be reconstructed into a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructionError {
    #[error("missing required field {0:?}")]
    MissingField(String),

    #[error("invalid field {field:?}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
