//! # FolioDB Core
//!
//! Persistence core for FolioDB, an embedded, single-file, schema-less
//! document database.
//!
//! This crate provides:
//! - An append-only log of newline-delimited encoded documents
//! - Streaming recovery: a last-writer-wins fold that tolerates torn tails
//!   and bounded corruption
//! - Crash-safe compaction through a backup sibling and an atomic rename
//! - A single-writer executor serialising appends, compactions and close
//! - Optional reversible serialization hooks per record
//!
//! ## Usage
//!
//! ```no_run
//! use folio_core::{Document, MemoryDatastore, Persistence, PersistenceOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> folio_core::CoreResult<()> {
//! let datastore = Arc::new(MemoryDatastore::new());
//! let persistence = Persistence::new(PersistenceOptions::new("users.db"), &datastore)?;
//!
//! // Reconstructs in-memory state from the log and rewrites it once.
//! persistence.load()?;
//!
//! let doc = Document::try_from(json!({"_id": "u1", "name": "ada"})).unwrap();
//! datastore.upsert(doc.clone());
//! persistence.append(vec![doc])?;
//!
//! persistence.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;

pub mod config;
pub mod datastore;
pub mod error;
pub mod events;
pub mod executor;
pub mod hooks;
pub mod log;
pub mod persistence;
pub mod record;

pub use config::{PersistenceOptions, StringHook, DEFAULT_CORRUPT_ALERT_THRESHOLD};
pub use datastore::{Datastore, MemoryDatastore};
pub use error::{CoreError, CoreResult};
pub use events::{CompactionStats, PersistenceEvent};
pub use folio_codec::{Document, IndexSpec};
pub use persistence::{Persistence, MIN_AUTOCOMPACTION_INTERVAL};
pub use record::Record;
