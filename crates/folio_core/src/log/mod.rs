//! The append-only document log.
//!
//! The log is a UTF-8 text file of newline-terminated records, each the
//! encoded image of one document. Mutations only ever append: an overwrite
//! is a newer record with the same `_id`, a deletion is a tombstone record.
//! Reconstruction is a last-writer-wins fold over the stream.
//!
//! ## Recovery Policy
//!
//! Reading distinguishes between **tolerated** and **fatal** conditions:
//!
//! ### Tolerated (counted, recovery continues)
//!
//! - A slice that is not UTF-8, fails decoding, or decodes to an
//!   unstructured document counts as one corrupt item.
//! - A trailing slice with no terminating newline is a torn tail from a
//!   crash mid-append. It counts as one corrupt item and ends the stream.
//!
//! ### Fatal
//!
//! - An I/O error while reading aborts the stream.
//! - A corruption ratio above the configured threshold aborts the fold,
//!   leaving the caller with empty state and the log untouched.

mod fold;
mod reader;

pub use fold::{fold, FoldOutcome};
pub use reader::{stream, LogStream, RecordOutcome};
