//! Crash-safe log compaction.
//!
//! Compaction rewrites the log so it contains exactly one record per live
//! document plus one record per declared non-primary index, dropping every
//! tombstone and superseded version.
//!
//! ## Invariants
//!
//! - Compaction MUST NOT change logical state: a fold of the rewritten log
//!   equals a fold of the original.
//! - The rename of the backup onto the log is the only commit point. A
//!   crash at any earlier step leaves the old log authoritative; the
//!   orphaned backup is resolved by the integrity pass on the next load.
//! - A failure at or after the commit point releases the log descriptor:
//!   the outgoing descriptor's inode may have been renamed away, and a
//!   write through it would land in a file no longer reachable at the log
//!   path. Later appends fail with `NotOpen` until the next load.
//! - Compaction runs on the executor, so no append interleaves with the
//!   rename.

use crate::error::{CoreError, CoreResult};
use crate::events::{CompactionStats, PersistenceEvent};
use crate::persistence::PersistenceInner;
use folio_codec::ID_FIELD;
use folio_storage::StorageError;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::atomic::Ordering;
use tracing::debug;

/// Floor for the best-effort space reservation on the backup file.
const MIN_PREALLOCATION: u64 = 32 * 1024;

/// Rewrites the log from the in-memory state of the owning datastore.
///
/// With `reopen`, the freshly renamed log is reopened for append and the
/// new descriptor installed; otherwise the outgoing descriptor is closed.
/// On success the written-records counter resets and a
/// [`PersistenceEvent::CompactionDone`] is emitted on the datastore.
///
/// # Errors
///
/// A failure before the rename aborts the rewrite and is returned to the
/// submitter; the log is untouched and a partial backup may be left behind
/// for the next load's integrity pass to discard. A failure at or after
/// the rename is also returned, but the log may already hold the rewritten
/// content; the outgoing descriptor is released in that case, so later
/// appends fail with [`CoreError::NotOpen`] instead of silently writing
/// through a descriptor whose inode was renamed away. The committed
/// content is recovered by the next load.
pub(crate) fn compact(inner: &PersistenceInner, reopen: bool) -> CoreResult<CompactionStats> {
    let datastore = inner.datastore()?;
    let path = &inner.path;
    let backup = folio_storage::backup_path(path);

    let current_size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    let backup_file =
        File::create(&backup).map_err(|e| StorageError::io("create_backup", e))?;
    if let Err(e) = folio_storage::preallocate(&backup_file, current_size.max(MIN_PREALLOCATION)) {
        debug!(error = %e, "backup preallocation failed, continuing without it");
    }

    let mut writer = BufWriter::new(backup_file);
    let mut documents = 0usize;
    datastore.for_each(&mut |doc| {
        let line = inner.hooks.encode_document(doc)?;
        write_record(&mut writer, &line)?;
        documents += 1;
        Ok(())
    })?;

    let mut indexes = 0usize;
    for spec in datastore.index_specs() {
        // The primary-key declaration is implicit and never written.
        if spec.field_name == ID_FIELD {
            continue;
        }
        let line = inner.hooks.encode_document(&spec.to_document())?;
        write_record(&mut writer, &line)?;
        indexes += 1;
    }

    writer
        .flush()
        .map_err(|e| StorageError::io("flush_backup", e))?;
    let backup_file = writer
        .into_inner()
        .map_err(|e| StorageError::io("flush_backup", e.into_error()))?;
    folio_storage::fsync(&backup_file)?;
    let bytes = backup_file
        .metadata()
        .map_err(|e| StorageError::io("stat_backup", e))?
        .len();
    drop(backup_file);

    // The rename is the commit point, and a crash_safe_rename error cannot
    // be told apart from a failure just after the rename took effect. From
    // here on every failure path releases the outgoing descriptor.
    if let Err(e) = folio_storage::crash_safe_rename(&backup, path) {
        inner.install_file(None);
        return Err(e.into());
    }

    if reopen {
        #[cfg(test)]
        if inner.fail_next_reopen.swap(false, Ordering::SeqCst) {
            inner.install_file(None);
            return Err(CoreError::OpenFailed {
                path: path.clone(),
                source: std::io::Error::other("injected reopen failure"),
            });
        }
        match folio_storage::open_append(path) {
            Ok(file) => {
                // Installing the new descriptor drops the outgoing one; two
                // are never held at once.
                inner.install_file(Some(file));
            }
            Err(StorageError::Io { source, .. }) => {
                inner.install_file(None);
                return Err(CoreError::OpenFailed {
                    path: path.clone(),
                    source,
                });
            }
        }
    } else {
        inner.install_file(None);
    }

    inner.written_since_compaction.store(0, Ordering::SeqCst);

    let stats = CompactionStats {
        documents,
        indexes,
        bytes,
    };
    datastore.emit(PersistenceEvent::CompactionDone(stats));
    debug!(documents, indexes, bytes, "compaction complete");
    Ok(stats)
}

fn write_record(writer: &mut BufWriter<File>, line: &str) -> CoreResult<()> {
    writer
        .write_all(line.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .map_err(|e| StorageError::io("write_backup", e).into())
}
