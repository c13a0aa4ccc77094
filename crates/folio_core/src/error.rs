//! Error types for the persistence core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for persistence operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in persistence operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage layer error, surfaced unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] folio_storage::StorageError),

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] folio_codec::CodecError),

    /// An option combination is invalid.
    #[error("inconsistent configuration: {message}")]
    ConfigurationInconsistent {
        /// Description of the inconsistency.
        message: String,
    },

    /// The serialization hook pair failed the invertibility check.
    #[error("serialization hooks are not invertible")]
    CodecNotInvertible,

    /// Too many corrupt records were found while loading the log.
    #[error("corruption threshold exceeded: {corrupt} of {total} records corrupt")]
    CorruptionThresholdExceeded {
        /// Number of corrupt record slices.
        corrupt: usize,
        /// Total record slices observed.
        total: usize,
    },

    /// The log could not be opened for append.
    #[error("could not open log for append: {path}")]
    OpenFailed {
        /// Path of the log that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// No open log descriptor: the log was never loaded, or loading failed.
    #[error("log is not open")]
    NotOpen,

    /// Mutating call after `close`.
    #[error("persistence is closed")]
    Closed,

    /// The owning datastore was dropped while an operation was in flight.
    #[error("datastore has been dropped")]
    DatastoreDropped,

    /// The executor stopped before the task completed.
    #[error("executor stopped before completion")]
    ExecutorStopped,
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationInconsistent {
            message: message.into(),
        }
    }
}
