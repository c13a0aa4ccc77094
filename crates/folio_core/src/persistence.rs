//! The persistence controller.
//!
//! One controller owns one append-only log. It orchestrates the full
//! lifecycle: loading (integrity pass, stream read, fold, initial rewrite),
//! serialised appends, crash-safe compactions, the autocompaction timer and
//! the terminal compaction on close.
//!
//! ## Descriptor state machine
//!
//! ```text
//!          ┌──── load() ────────┐
//! Closed ──┤                    ├──► Open
//!          └── close() after ───┘
//!             terminal compact
//! ```
//!
//! The log descriptor exists only in the Open state. A `reopen` compaction
//! re-enters Open by installing the new descriptor before the old one is
//! dropped; every other path out of Open releases it.

use crate::compaction;
use crate::config::PersistenceOptions;
use crate::datastore::Datastore;
use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::hooks::SerializationHooks;
use crate::log::{fold, stream};
use folio_codec::{Document, IndexSpec};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Floor for the autocompaction interval.
pub const MIN_AUTOCOMPACTION_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state between the controller, the executor tasks and the timer.
pub(crate) struct PersistenceInner {
    pub(crate) path: PathBuf,
    pub(crate) in_memory_only: bool,
    pub(crate) corrupt_alert_threshold: f64,
    pub(crate) hooks: SerializationHooks,
    pub(crate) datastore: Weak<dyn Datastore>,
    pub(crate) file: Mutex<Option<File>>,
    pub(crate) written_since_compaction: AtomicU64,
    pub(crate) closed: AtomicBool,
    /// Forces the next post-rename reopen to fail.
    ///
    /// This allows tests to drive the descriptor-release path without
    /// arranging a real I/O fault between the rename and the reopen.
    #[cfg(test)]
    pub(crate) fail_next_reopen: AtomicBool,
}

impl PersistenceInner {
    /// Upgrades the back-reference to the owning datastore.
    pub(crate) fn datastore(&self) -> CoreResult<Arc<dyn Datastore>> {
        self.datastore.upgrade().ok_or(CoreError::DatastoreDropped)
    }

    /// Replaces the log descriptor, dropping the previous one.
    pub(crate) fn install_file(&self, file: Option<File>) {
        *self.file.lock() = file;
    }

    /// Removes the log and its backup and resets the in-memory state.
    fn drop_datafile_sync(&self) -> CoreResult<()> {
        self.install_file(None);
        folio_storage::remove_file_if_exists(&self.path)?;
        folio_storage::remove_file_if_exists(&folio_storage::backup_path(&self.path))?;
        if let Ok(datastore) = self.datastore() {
            datastore.reset(Vec::new(), Vec::new());
        }
        self.written_since_compaction.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Encodes and appends a batch; all records land or none are reported.
    fn append_batch(&self, docs: &[Document]) -> CoreResult<()> {
        let mut payload = String::new();
        for doc in docs {
            payload.push_str(&self.hooks.encode_document(doc)?);
            payload.push('\n');
        }

        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(CoreError::NotOpen)?;
        folio_storage::append(file, payload.as_bytes())?;
        folio_storage::fsync(file)?;

        self.written_since_compaction
            .fetch_add(docs.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

struct TimerSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct AutocompactionTimer {
    signal: Arc<TimerSignal>,
    thread: JoinHandle<()>,
}

/// The persistence controller for one append-only log.
///
/// # Example
///
/// ```no_run
/// use folio_core::{MemoryDatastore, Persistence, PersistenceOptions};
/// use folio_core::Document;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # fn main() -> folio_core::CoreResult<()> {
/// let datastore = Arc::new(MemoryDatastore::new());
/// let persistence = Persistence::new(PersistenceOptions::new("users.db"), &datastore)?;
/// persistence.load()?;
///
/// let doc = Document::try_from(json!({"_id": "u1", "name": "ada"})).unwrap();
/// datastore.upsert(doc.clone());
/// persistence.append(vec![doc])?;
/// persistence.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Persistence {
    inner: Arc<PersistenceInner>,
    executor: Arc<Executor>,
    timer: Mutex<Option<AutocompactionTimer>>,
}

impl Persistence {
    /// Creates a controller from options and the owning datastore.
    ///
    /// The controller holds only a weak back-reference; the datastore stays
    /// the sole root of the object graph.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ConfigurationInconsistent`] when the filename is
    ///   missing or ends in the reserved `~` suffix, or when only one of
    ///   the two serialization hooks is supplied.
    /// - [`CoreError::CodecNotInvertible`] when the hook pair fails its
    ///   verification sample.
    pub fn new<D>(options: PersistenceOptions, datastore: &Arc<D>) -> CoreResult<Self>
    where
        D: Datastore + 'static,
    {
        if !options.in_memory_only {
            if options.filename.as_os_str().is_empty() {
                return Err(CoreError::configuration(
                    "a filename is required unless in_memory_only is set",
                ));
            }
            if options.filename.to_string_lossy().ends_with('~') {
                return Err(CoreError::configuration(
                    "filename must not end in ~, which is reserved for the compaction backup",
                ));
            }
        }

        let hooks = SerializationHooks::new(
            options.after_serialization.clone(),
            options.before_deserialization.clone(),
        )?;

        let datastore: Arc<dyn Datastore> = datastore.clone();
        let datastore: Weak<dyn Datastore> = Arc::downgrade(&datastore);
        let inner = Arc::new(PersistenceInner {
            path: options.filename,
            in_memory_only: options.in_memory_only,
            corrupt_alert_threshold: options.corrupt_alert_threshold,
            hooks,
            datastore,
            file: Mutex::new(None),
            written_since_compaction: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            #[cfg(test)]
            fail_next_reopen: AtomicBool::new(false),
        });

        Ok(Self {
            inner,
            executor: Arc::new(Executor::new()),
            timer: Mutex::new(None),
        })
    }

    /// Loads the log and reconstructs the in-memory state.
    ///
    /// Ensures the parent directory exists, resolves any half-finished
    /// rewrite, opens the log for append, folds the record stream, hands
    /// the live documents and index declarations to the datastore, rewrites
    /// the log once, and finally releases any requests the executor
    /// buffered before the load.
    ///
    /// # Errors
    ///
    /// On any failure the datastore is reset to empty, no descriptor stays
    /// installed, and buffered requests remain parked. Notable cases:
    /// [`CoreError::OpenFailed`] when the log cannot be opened for append
    /// and [`CoreError::CorruptionThresholdExceeded`] when too many records
    /// are corrupt (the log itself is left untouched).
    pub fn load(&self) -> CoreResult<()> {
        if self.inner.in_memory_only {
            self.inner.closed.store(false, Ordering::SeqCst);
            self.executor.process_buffer();
            return Ok(());
        }
        match self.load_inner() {
            Ok(()) => {
                self.inner.closed.store(false, Ordering::SeqCst);
                self.executor.process_buffer();
                Ok(())
            }
            Err(e) => {
                self.inner.install_file(None);
                if let Ok(datastore) = self.inner.datastore() {
                    datastore.reset(Vec::new(), Vec::new());
                }
                Err(e)
            }
        }
    }

    fn load_inner(&self) -> CoreResult<()> {
        let inner = &self.inner;
        let datastore = inner.datastore()?;

        if let Some(parent) = inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                folio_storage::mkdir_p(parent)?;
            }
        }
        folio_storage::ensure_datafile_integrity(&inner.path)?;

        let file = folio_storage::open_append(&inner.path).map_err(|e| match e {
            folio_storage::StorageError::Io { source, .. } => CoreError::OpenFailed {
                path: inner.path.clone(),
                source,
            },
        })?;
        inner.install_file(Some(file));

        let outcome = fold(
            stream(&inner.path, &inner.hooks)?,
            inner.corrupt_alert_threshold,
        )?;
        if outcome.corrupt > 0 {
            warn!(
                corrupt = outcome.corrupt,
                total = outcome.total,
                "tolerated corrupt records while loading the log"
            );
        }

        let indexes: Vec<IndexSpec> = outcome.indexes.into_values().collect();
        datastore.reset(outcome.documents, indexes);

        compaction::compact(inner, true)?;
        debug!(path = %inner.path.display(), "log loaded");
        Ok(())
    }

    /// Appends a batch of new document states to the log.
    ///
    /// An empty batch is a no-op. The batch is encoded record-by-record,
    /// written in one append, and fsynced; it either lands in full or the
    /// underlying I/O error is returned. Appends are serialised by the
    /// executor, so batches submitted in order land in order.
    pub fn append(&self, docs: Vec<Document>) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CoreError::Closed);
        }
        if self.inner.in_memory_only || docs.is_empty() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        self.executor
            .submit(move || inner.append_batch(&docs))
            .wait()
    }

    /// Runs a compaction, returning once the rename and reopen completed.
    pub fn compact(&self) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CoreError::Closed);
        }
        if self.inner.in_memory_only {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        self.executor
            .submit(move || compaction::compact(&inner, true).map(|_| ()))
            .wait()
    }

    /// Starts (or restarts) the autocompaction timer.
    ///
    /// Each tick enqueues a compaction only when at least `min_writes`
    /// records have been appended since the last one. The next tick is
    /// armed only after that compaction completes, so two compactions never
    /// overlap. The interval is clamped to
    /// [`MIN_AUTOCOMPACTION_INTERVAL`]. Any previously running timer is
    /// cancelled first.
    pub fn set_autocompaction(&self, interval: Duration, min_writes: u64) {
        self.stop_autocompaction();
        if self.inner.in_memory_only || self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let interval = interval.max(MIN_AUTOCOMPACTION_INTERVAL);
        let signal = Arc::new(TimerSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let inner = Arc::clone(&self.inner);
        let executor = Arc::clone(&self.executor);
        let thread_signal = Arc::clone(&signal);
        let thread = thread::spawn(move || loop {
            {
                let mut stopped = thread_signal.stopped.lock();
                if *stopped {
                    return;
                }
                thread_signal.wake.wait_for(&mut stopped, interval);
                if *stopped {
                    return;
                }
            }
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            // Before load completes a tick would park behind the buffer
            // and stall the timer; skip until the queue is live.
            if executor.is_buffering() {
                continue;
            }
            if inner.written_since_compaction.load(Ordering::SeqCst) < min_writes {
                continue;
            }
            let task_inner = Arc::clone(&inner);
            let outcome = executor
                .submit(move || compaction::compact(&task_inner, true).map(|_| ()))
                .wait();
            if let Err(e) = outcome {
                warn!(error = %e, "autocompaction failed");
            }
            // The next tick is armed only here, after completion.
        });

        *self.timer.lock() = Some(AutocompactionTimer { signal, thread });
    }

    /// Stops the autocompaction timer.
    ///
    /// Idempotent. Cancels the pending tick but never a compaction that is
    /// already running; a running one finishes before this returns.
    pub fn stop_autocompaction(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            *timer.signal.stopped.lock() = true;
            timer.signal.wake.notify_all();
            let _ = timer.thread.join();
        }
    }

    /// Closes the controller.
    ///
    /// Stops autocompaction and runs a terminal compaction that closes the
    /// log descriptor instead of reopening it. The log file itself is
    /// preserved. Later mutating calls fail with [`CoreError::Closed`];
    /// closing twice is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        self.stop_autocompaction();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.inner.in_memory_only {
            return Ok(());
        }
        if self.executor.is_buffering() {
            // Nothing was ever loaded, so there is no state to flush and a
            // buffered task would wait on a load that will not come.
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let result = self
            .executor
            .submit(move || compaction::compact(&inner, false).map(|_| ()))
            .wait();
        if result.is_err() {
            // Even a failed close exits the Open state.
            self.inner.install_file(None);
        }
        result
    }

    /// Removes the log and its backup and resets the in-memory state.
    ///
    /// Unlike [`Persistence::close`], this deletes the data. The controller
    /// stays usable afterwards; a later [`Persistence::load`] sees a fresh
    /// database. Serialised by the executor once the log is loaded; before
    /// that it runs directly, since no other operation can be in flight.
    pub fn drop_datafile(&self) -> CoreResult<()> {
        self.stop_autocompaction();
        if self.inner.in_memory_only {
            if let Ok(datastore) = self.inner.datastore() {
                datastore.reset(Vec::new(), Vec::new());
            }
            self.inner.written_since_compaction.store(0, Ordering::SeqCst);
            return Ok(());
        }
        if self.executor.is_buffering() {
            // No load has run, so nothing else can be in flight; a buffered
            // task would wait on a load that may never come.
            return self.inner.drop_datafile_sync();
        }

        let inner = Arc::clone(&self.inner);
        self.executor
            .submit(move || inner.drop_datafile_sync())
            .wait()
    }

    /// Records appended since the last completed compaction.
    #[must_use]
    pub fn written_since_compaction(&self) -> u64 {
        self.inner.written_since_compaction.load(Ordering::SeqCst)
    }

    /// True once [`Persistence::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Persistence {
    fn drop(&mut self) {
        self.stop_autocompaction();
        self.executor.shutdown();
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("path", &self.inner.path)
            .field("in_memory_only", &self.inner.in_memory_only)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDatastore;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn rejects_reserved_filename() {
        let datastore = Arc::new(MemoryDatastore::new());
        let result = Persistence::new(PersistenceOptions::new("data.db~"), &datastore);
        assert!(matches!(
            result,
            Err(CoreError::ConfigurationInconsistent { .. })
        ));
    }

    #[test]
    fn rejects_missing_filename() {
        let datastore = Arc::new(MemoryDatastore::new());
        let result = Persistence::new(PersistenceOptions::new(""), &datastore);
        assert!(matches!(
            result,
            Err(CoreError::ConfigurationInconsistent { .. })
        ));
    }

    #[test]
    fn rejects_half_configured_hooks() {
        let datastore = Arc::new(MemoryDatastore::new());
        let options = PersistenceOptions::new("data.db").after_serialization(|s| s.to_owned());
        let result = Persistence::new(options, &datastore);
        assert!(matches!(
            result,
            Err(CoreError::ConfigurationInconsistent { .. })
        ));
    }

    #[test]
    fn in_memory_mode_is_a_noop() {
        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::in_memory(), &datastore).unwrap();

        persistence.load().unwrap();
        persistence
            .append(vec![doc(json!({"_id": "a", "x": 1}))])
            .unwrap();
        persistence.compact().unwrap();
        persistence.set_autocompaction(Duration::from_secs(10), 1);
        persistence.stop_autocompaction();
        persistence.close().unwrap();

        assert_eq!(persistence.written_since_compaction(), 0);
        assert!(datastore.take_events().is_empty());
    }

    #[test]
    fn in_memory_drop_resets_state() {
        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::in_memory(), &datastore).unwrap();
        persistence.load().unwrap();
        datastore.upsert(doc(json!({"_id": "a"})));

        persistence.drop_datafile().unwrap();
        assert!(datastore.is_empty());
    }

    #[test]
    fn close_is_idempotent_and_blocks_mutations() {
        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::in_memory(), &datastore).unwrap();
        persistence.load().unwrap();

        persistence.close().unwrap();
        persistence.close().unwrap();
        assert!(persistence.is_closed());
        assert!(matches!(
            persistence.append(vec![doc(json!({"_id": "a"}))]),
            Err(CoreError::Closed)
        ));
        assert!(matches!(persistence.compact(), Err(CoreError::Closed)));
    }

    #[test]
    fn stop_autocompaction_without_timer_is_a_noop() {
        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::in_memory(), &datastore).unwrap();
        persistence.stop_autocompaction();
        persistence.stop_autocompaction();
    }

    #[test]
    fn reopen_failure_after_rename_releases_the_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::new(&path), &datastore).unwrap();
        persistence.load().unwrap();

        datastore.upsert(doc(json!({"_id": "a", "x": 1})));
        persistence
            .append(vec![doc(json!({"_id": "a", "x": 1}))])
            .unwrap();

        persistence
            .inner
            .fail_next_reopen
            .store(true, Ordering::SeqCst);
        assert!(matches!(
            persistence.compact(),
            Err(CoreError::OpenFailed { .. })
        ));

        // The rename committed and the stale descriptor is gone, so the
        // next append fails loudly instead of landing in the renamed-away
        // inode.
        assert!(matches!(
            persistence.append(vec![doc(json!({"_id": "b"}))]),
            Err(CoreError::NotOpen)
        ));

        // The committed rewrite is what the next load recovers.
        let verify_store = Arc::new(MemoryDatastore::new());
        let verify =
            Persistence::new(PersistenceOptions::new(&path), &verify_store).unwrap();
        verify.load().unwrap();
        assert_eq!(verify_store.get("a").unwrap().get("x"), Some(&json!(1)));
    }
}
