//! Error types for the registry snapshot.

use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while loading the registry.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
