//! Observable persistence events.
//!
//! Events are delivered to the owning datastore via
//! [`crate::Datastore::emit`]; the persistence layer never talks to
//! subscribers directly.

/// Statistics from a completed compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Live documents written to the rewritten log.
    pub documents: usize,
    /// Index declarations written.
    pub indexes: usize,
    /// Size of the rewritten log in bytes.
    pub bytes: u64,
}

/// Events emitted on the owning datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceEvent {
    /// A compaction completed: the rewritten log was renamed into place and,
    /// when requested, reopened for append.
    CompactionDone(CompactionStats),
}
