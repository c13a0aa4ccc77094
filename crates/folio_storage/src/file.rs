//! Path and file operations for the log and its backup sibling.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Returns the backup path for a log: the same path with a trailing `~`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("~");
    PathBuf::from(name)
}

/// Creates a directory and all of its parents.
///
/// # Errors
///
/// Returns an error if a component cannot be created.
pub fn mkdir_p(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io("mkdir_p", e))
}

/// Opens the log for reading and appending, creating it if missing.
pub fn open_append(path: &Path) -> StorageResult<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| StorageError::io("open", e))
}

/// Appends bytes to an open descriptor.
///
/// The write either lands in full or an error is returned; callers must not
/// treat an error as a partial success.
pub fn append(file: &mut File, bytes: &[u8]) -> StorageResult<()> {
    file.write_all(bytes).map_err(|e| StorageError::io("append", e))
}

/// Forces file contents and metadata to durable storage.
pub fn fsync(file: &File) -> StorageResult<()> {
    file.sync_all().map_err(|e| StorageError::io("fsync", e))
}

/// Reserves space for a file ahead of writing it.
///
/// This is an optimisation only. Callers ignore failures; no correctness
/// property may depend on the reservation taking effect.
pub fn preallocate(file: &File, len: u64) -> StorageResult<()> {
    file.allocate(len)
        .map_err(|e| StorageError::io("preallocate", e))
}

/// Atomically replaces `dst` with `src` and makes the replacement durable.
///
/// `rename` is atomic on POSIX; on Windows it maps to `MoveFileExW` with
/// replace semantics. The parent directory is fsynced afterwards on Unix so
/// the new directory entry survives a crash.
pub fn crash_safe_rename(src: &Path, dst: &Path) -> StorageResult<()> {
    fs::rename(src, dst).map_err(|e| StorageError::io("rename", e))?;
    if let Some(parent) = dst.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Resolves a half-finished log rewrite left behind by a crash.
///
/// A rewrite writes the full new log to the backup sibling and commits it by
/// renaming the backup onto the log. If a backup still exists when the log
/// is opened, exactly one of the two files holds a complete collection:
///
/// - log present: the rename never happened, the log is authoritative and
///   the stale backup is removed
/// - log absent: the backup is complete and is promoted to the log
pub fn ensure_datafile_integrity(path: &Path) -> StorageResult<()> {
    let backup = backup_path(path);
    if !backup.exists() {
        return Ok(());
    }
    if path.exists() {
        fs::remove_file(&backup).map_err(|e| StorageError::io("remove_backup", e))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }
        Ok(())
    } else {
        crash_safe_rename(&backup, path)
    }
}

/// Removes a file if present. Returns `Ok(false)` when it did not exist.
pub fn remove_file_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io("remove", e)),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StorageResult<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    let handle = File::open(dir).map_err(|e| StorageError::io("open_dir", e))?;
    handle.sync_all().map_err(|e| StorageError::io("fsync_dir", e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StorageResult<()> {
    // NTFS journalling covers metadata durability; directory fsync is not
    // available on Windows.
    Ok(())
}
