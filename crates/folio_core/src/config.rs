//! Persistence configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Corruption ratio above which a load is aborted, unless overridden.
pub const DEFAULT_CORRUPT_ALERT_THRESHOLD: f64 = 0.1;

/// A string-level serialization hook applied to each encoded record.
pub type StringHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options for constructing a [`crate::Persistence`] controller.
///
/// # Example
///
/// ```
/// use folio_core::PersistenceOptions;
///
/// let options = PersistenceOptions::new("data/users.db")
///     .corrupt_alert_threshold(0.05);
/// ```
#[derive(Clone)]
pub struct PersistenceOptions {
    /// Path of the append-only log. Must not end in `~`, which is reserved
    /// for the compaction backup sibling.
    pub filename: PathBuf,

    /// Disables all I/O; every persistence operation becomes a no-op.
    pub in_memory_only: bool,

    /// Corruption ratio above which a load fails.
    pub corrupt_alert_threshold: f64,

    /// Hook applied to each record after document serialization.
    /// Must be supplied together with `before_deserialization`.
    pub after_serialization: Option<StringHook>,

    /// Hook applied to each record before document deserialization.
    /// Must be supplied together with `after_serialization`.
    pub before_deserialization: Option<StringHook>,
}

impl PersistenceOptions {
    /// Creates file-backed options for the given log path.
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            in_memory_only: false,
            corrupt_alert_threshold: DEFAULT_CORRUPT_ALERT_THRESHOLD,
            after_serialization: None,
            before_deserialization: None,
        }
    }

    /// Creates options for a purely in-memory collection.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Sets whether all I/O is disabled.
    #[must_use]
    pub fn in_memory_only(mut self, value: bool) -> Self {
        self.in_memory_only = value;
        self
    }

    /// Sets the corruption ratio above which a load fails.
    #[must_use]
    pub fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.corrupt_alert_threshold = threshold;
        self
    }

    /// Sets the hook applied after document serialization.
    #[must_use]
    pub fn after_serialization(
        mut self,
        hook: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.after_serialization = Some(Arc::new(hook));
        self
    }

    /// Sets the hook applied before document deserialization.
    #[must_use]
    pub fn before_deserialization(
        mut self,
        hook: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.before_deserialization = Some(Arc::new(hook));
        self
    }
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            in_memory_only: true,
            corrupt_alert_threshold: DEFAULT_CORRUPT_ALERT_THRESHOLD,
            after_serialization: None,
            before_deserialization: None,
        }
    }
}

impl fmt::Debug for PersistenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceOptions")
            .field("filename", &self.filename)
            .field("in_memory_only", &self.in_memory_only)
            .field("corrupt_alert_threshold", &self.corrupt_alert_threshold)
            .field("after_serialization", &self.after_serialization.is_some())
            .field("before_deserialization", &self.before_deserialization.is_some())
            .finish()
    }
}
