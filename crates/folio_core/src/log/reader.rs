//! Streaming log reader.

use crate::error::CoreResult;
use crate::hooks::SerializationHooks;
use crate::record::Record;
use folio_storage::StorageError;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

/// Outcome of reading one newline-terminated slice of the log.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The slice decoded and classified to a record.
    Parsed(Record),
    /// The slice failed decoding or classification.
    Corrupt,
}

/// A lazy stream of record outcomes over a log file.
///
/// Bytes are consumed in buffered chunks and one outcome is emitted per
/// newline-terminated slice. The stream stays O(1) in memory regardless of
/// log size.
pub struct LogStream<'a> {
    reader: Option<BufReader<File>>,
    hooks: &'a SerializationHooks,
    finished: bool,
}

/// Opens a stream over the log at `path`.
///
/// A missing file is not an error: the stream is simply empty.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened for reading.
pub fn stream<'a>(path: &Path, hooks: &'a SerializationHooks) -> CoreResult<LogStream<'a>> {
    let reader = match File::open(path) {
        Ok(file) => Some(BufReader::new(file)),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(StorageError::io("open", e).into()),
    };
    Ok(LogStream {
        reader,
        hooks,
        finished: false,
    })
}

impl LogStream<'_> {
    fn decode(&self, raw: &[u8]) -> RecordOutcome {
        let Ok(text) = std::str::from_utf8(raw) else {
            return RecordOutcome::Corrupt;
        };
        match self.hooks.decode_line(text) {
            Ok(doc) => match Record::classify(doc) {
                Some(record) => RecordOutcome::Parsed(record),
                None => RecordOutcome::Corrupt,
            },
            Err(_) => RecordOutcome::Corrupt,
        }
    }
}

impl Iterator for LogStream<'_> {
    type Item = CoreResult<RecordOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let reader = self.reader.as_mut()?;

        let mut slice = Vec::new();
        match reader.read_until(b'\n', &mut slice) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                if slice.last() == Some(&b'\n') {
                    slice.pop();
                } else {
                    // Torn tail: bytes after the last newline never
                    // finished appending.
                    self.finished = true;
                    return Some(Ok(RecordOutcome::Corrupt));
                }
                Some(Ok(self.decode(&slice)))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(StorageError::io("read", e).into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn hooks() -> SerializationHooks {
        SerializationHooks::plain()
    }

    fn write_log(dir: &tempfile::TempDir, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("log.db");
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    fn collect(path: &Path, hooks: &SerializationHooks) -> Vec<RecordOutcome> {
        stream(path, hooks)
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn missing_file_is_empty_stream() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let outcomes = collect(&dir.path().join("absent.db"), &hooks);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn reads_terminated_records() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"{\"_id\":\"a\",\"x\":1}\n{\"_id\":\"b\"}\n");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, RecordOutcome::Parsed(Record::Upsert(_)))));
    }

    #[test]
    fn nothing_after_final_newline_is_not_a_record() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"{\"_id\":\"a\"}\n");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn torn_tail_is_one_corrupt_item() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"{\"_id\":\"a\"}\n{\"_id\":\"b\"");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], RecordOutcome::Parsed(_)));
        assert!(matches!(outcomes[1], RecordOutcome::Corrupt));
    }

    #[test]
    fn torn_tail_that_would_parse_is_still_corrupt() {
        // A complete record image without its newline never committed.
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"{\"_id\":\"a\"}");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RecordOutcome::Corrupt));
    }

    #[test]
    fn garbage_lines_are_corrupt() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"{\"_id\":\"a\"}\nnot json\n\xff\xfe\x00\n{\"x\":1}\n");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[0], RecordOutcome::Parsed(_)));
        assert!(matches!(outcomes[1], RecordOutcome::Corrupt));
        assert!(matches!(outcomes[2], RecordOutcome::Corrupt));
        assert!(matches!(outcomes[3], RecordOutcome::Corrupt));
    }

    #[test]
    fn empty_file_is_empty_stream() {
        let dir = tempdir().unwrap();
        let hooks = hooks();
        let path = write_log(&dir, b"");
        assert!(collect(&path, &hooks).is_empty());
    }

    #[test]
    fn decodes_through_hooks() {
        let hooks = SerializationHooks::new(
            Some(std::sync::Arc::new(|s: &str| format!("v1:{s}"))),
            Some(std::sync::Arc::new(|s: &str| {
                s.strip_prefix("v1:").unwrap_or(s).to_owned()
            })),
        )
        .unwrap();

        let dir = tempdir().unwrap();
        let path = write_log(&dir, b"v1:{\"_id\":\"a\"}\n");

        let outcomes = collect(&path, &hooks);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            RecordOutcome::Parsed(Record::Upsert(d)) if d.id() == Some("a")
        ));
    }
}
