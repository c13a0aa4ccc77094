//! # FolioDB Storage
//!
//! Filesystem primitives for the FolioDB append-only log.
//!
//! This crate is the lowest layer of the stack. It knows nothing about
//! records or documents; it moves bytes and guarantees durability:
//!
//! - append + fsync for the write path
//! - write-then-rename with directory fsync for atomic log rewrites
//! - recovery of a half-finished rewrite from the `~` backup sibling
//!
//! ## Backup convention
//!
//! A log at `data.db` is rewritten through its backup sibling `data.db~`.
//! The rename of the backup onto the log is the only commit point, so a
//! crash at any instant leaves either the old or the new log on disk.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;

pub use error::{StorageError, StorageResult};
pub use file::{
    append, backup_path, crash_safe_rename, ensure_datafile_integrity, fsync, mkdir_p,
    open_append, preallocate, remove_file_if_exists,
};
