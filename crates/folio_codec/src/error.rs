//! Error types for the document codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding documents.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialisation or parse error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The value is valid JSON but not an object.
    #[error("document is not a JSON object")]
    NotAnObject,

    /// An encoded record contains an embedded newline.
    ///
    /// Records are newline-delimited on disk, so a transform that introduces
    /// a raw newline would corrupt every record that follows it.
    #[error("encoded record contains an embedded newline")]
    EmbeddedNewline,
}
