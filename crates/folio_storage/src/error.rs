//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error, tagged with the operation that failed.
    #[error("{op} failed: {source}")]
    Io {
        /// The storage operation that failed.
        op: &'static str,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Creates an I/O error tagged with the failing operation.
    #[must_use]
    pub fn io(op: &'static str, source: io::Error) -> Self {
        Self::Io { op, source }
    }

    /// Returns the underlying I/O error kind.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Io { source, .. } => source.kind(),
        }
    }
}
