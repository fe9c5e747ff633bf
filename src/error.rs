//! Error types for `geocache`.
//!
//! Per the propagation policy: internal exceptions are recovered at
//! component boundaries. Only argument-validation errors cross the public
//! API as `Err`; not-found and transient conditions are represented as
//! `None`/`false` returns on the methods that document them that way.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced across the cache, file store, and retrieval boundaries.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A key, address, or size argument was invalid (null/empty address,
    /// non-positive size, size exceeding capacity, negative capacity).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempted to remove the configured write root of a `FileStore`.
    #[error("cannot remove the write root at {0}")]
    WriteRootRemoval(PathBuf),

    /// A filesystem operation failed (directory creation, file write/delete).
    /// Storage errors never mark an address absent; callers revert the
    /// affected index entry from `Pending` to `None` instead.
    #[error("storage error at {path}: {source}")]
    Storage {
        /// Path the operation was attempted against.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed or resolved (bad TOML, unknown
    /// property name with no platform default).
    #[error("configuration error: {0}")]
    Config(String),

    /// The retrieval queue rejected a submission (at capacity).
    #[error("retrieval queue is full")]
    QueueFull,
}

impl CacheError {
    /// Builds a [`CacheError::Storage`] from an I/O error and the path
    /// that was being operated on.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Storage {
            path: path.into(),
            source,
        }
    }
}
