//! Error types for credential and topic authorization

use std::path::PathBuf;

/// Errors raised by the store, the authenticators and the registration service
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration section the feature depends on is absent
    #[error("configuration section '{0}' not found")]
    ConfigMissing(&'static str),

    /// Identity or secret string does not split into the expected fields
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// Registration or ACL payload could not be parsed
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    #[error("device '{device}' already registered for user '{username}'")]
    DuplicateDevice { username: String, device: String },

    #[error("ACL pattern '{pattern}' already present for user '{username}'")]
    DuplicateAclEntry { username: String, pattern: String },

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown device '{device}' for user '{username}'")]
    UnknownDevice { username: String, device: String },

    /// File read, write, rename or delete failure
    #[error("I/O error on {}: {source}", path.display())]
    PersistenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content could not be parsed or serialized
    #[error("invalid document {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// Blocking hash task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistenceIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Format {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
