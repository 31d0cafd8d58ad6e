//! Error types for the object client

use thiserror::Error;

use crate::key::ObjectKey;

/// Result type for object client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for object client operations
///
/// Failures of the production client are carried unchanged in [`Error::Kube`].
/// The `NotFound`, `AlreadyExists` and `Conflict` variants are produced by the
/// in-memory fake; use [`Error::is_not_found`] and friends to classify an error
/// regardless of which backend produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// No object matches the key
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    /// An object with the same key already exists
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    /// Write rejected because the stored object changed
    #[error("Conflict on {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: ObjectKey,
        message: String,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object rejected before reaching the store
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Manifest parsing error
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when no object matched the key
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// True when a write lost an optimistic concurrency race
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409 && resp.reason == "Conflict",
            _ => false,
        }
    }

    /// True when a create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }
}
