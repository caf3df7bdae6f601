//! Log writer with fsync enforcement
//!
//! Every append is flushed to stable storage before the sequence number is
//! returned. Acknowledgment before fsync is forbidden: a caller that holds a
//! sequence number may treat the mutation as committed.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::warn;

use super::errors::{WalError, WalResult};
use super::reader::LogReader;
use super::record::{LogRecord, RecordType};
use super::log_path;

/// Append-only log writer.
///
/// Opened with exclusive write access; one writer per storage root. On open,
/// a torn tail left by a crash is truncated to the last complete record so
/// that new appends extend a valid prefix.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    /// Next sequence number to assign (starts at 1, never reused)
    next_sequence: u64,
}

impl LogWriter {
    /// Opens or creates the log file inside `logs_dir`.
    ///
    /// Scans any existing records to find the highest sequence number and
    /// truncates an invalid tail before appending resumes.
    pub fn open(logs_dir: &Path) -> WalResult<Self> {
        fs::create_dir_all(logs_dir).map_err(|source| WalError::Open {
            path: logs_dir.to_path_buf(),
            source,
        })?;
        let path = log_path(logs_dir);

        let (last_sequence, valid_len) = Self::scan(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WalError::Open {
                path: path.clone(),
                source,
            })?;

        if let Some(valid_len) = valid_len {
            warn!(
                path = %path.display(),
                valid_len,
                "truncating torn log tail before reuse"
            );
            file.set_len(valid_len).map_err(WalError::Truncate)?;
            file.sync_all().map_err(WalError::Fsync)?;
        }

        Ok(Self {
            file,
            next_sequence: last_sequence + 1,
        })
    }

    /// Scans an existing log. Returns the highest valid sequence number and,
    /// if the tail is torn, the byte length of the valid prefix.
    fn scan(path: &Path) -> WalResult<(u64, Option<u64>)> {
        let mut reader = match LogReader::open(path) {
            Ok(reader) => reader,
            Err(WalError::Open { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Ok((0, None));
            }
            Err(e) => return Err(e),
        };

        loop {
            match reader.read_next() {
                Ok(Some(_)) => {}
                Ok(None) => return Ok((reader.last_sequence(), None)),
                Err(e) if e.is_corruption() => {
                    return Ok((reader.last_sequence(), Some(reader.valid_offset())));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends one mutation and flushes it to stable storage.
    ///
    /// Returns the assigned sequence number. If the write or fsync fails the
    /// record is not committed and the error propagates to the caller.
    pub fn append(&mut self, record_type: RecordType, key: &[u8], value: &[u8]) -> WalResult<u64> {
        let sequence = self.next_sequence;
        let record = match record_type {
            RecordType::Set => LogRecord::set(sequence, key, value),
            RecordType::Delete => LogRecord::delete(sequence, key),
        };

        self.file
            .write_all(&record.encode())
            .map_err(WalError::Append)?;
        self.file.sync_data().map_err(WalError::Fsync)?;

        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Truncates the log to zero length.
    ///
    /// Only valid once a durable checkpoint covers every record in the file.
    /// Sequence numbers keep increasing; they are never reset, so checkpoint
    /// position markers stay comparable across truncations.
    pub fn truncate(&mut self) -> WalResult<()> {
        self.file.set_len(0).map_err(WalError::Truncate)?;
        self.file.sync_all().map_err(WalError::Fsync)?;
        Ok(())
    }

    /// Raises the next sequence number above `sequence` if it is not already.
    ///
    /// Used after recovery when the checkpoint position is ahead of anything
    /// left in the (possibly truncated) log file.
    pub fn ensure_sequence_above(&mut self, sequence: u64) {
        if self.next_sequence <= sequence {
            self.next_sequence = sequence + 1;
        }
    }

    /// Sequence number the next append will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sequences_start_at_one_and_increase() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path()).unwrap();
        assert_eq!(writer.append(RecordType::Set, b"a", b"1").unwrap(), 1);
        assert_eq!(writer.append(RecordType::Set, b"b", b"2").unwrap(), 2);
        assert_eq!(writer.append(RecordType::Delete, b"a", b"").unwrap(), 3);
    }

    #[test]
    fn reopen_resumes_after_highest_sequence() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(dir.path()).unwrap();
            writer.append(RecordType::Set, b"a", b"1").unwrap();
            writer.append(RecordType::Set, b"b", b"2").unwrap();
        }
        let writer = LogWriter::open(dir.path()).unwrap();
        assert_eq!(writer.next_sequence(), 3);
    }

    #[test]
    fn reopen_truncates_torn_tail_and_appends_cleanly() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(dir.path()).unwrap();
            writer.append(RecordType::Set, b"a", b"1").unwrap();
            writer.append(RecordType::Set, b"b", b"2").unwrap();
        }
        let path = log_path(dir.path());
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let mut writer = LogWriter::open(dir.path()).unwrap();
        assert_eq!(writer.next_sequence(), 2);
        writer.append(RecordType::Set, b"c", b"3").unwrap();

        let mut reader = LogReader::open(&path).unwrap();
        let mut keys = Vec::new();
        while let Some(record) = reader.read_next().unwrap() {
            keys.push(record.key);
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn truncate_keeps_sequence_monotonic() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path()).unwrap();
        writer.append(RecordType::Set, b"a", b"1").unwrap();
        writer.truncate().unwrap();
        assert_eq!(writer.append(RecordType::Set, b"b", b"2").unwrap(), 2);
    }

    #[test]
    fn ensure_sequence_above_advances_only_forward() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path()).unwrap();
        writer.ensure_sequence_above(10);
        assert_eq!(writer.next_sequence(), 11);
        writer.ensure_sequence_above(4);
        assert_eq!(writer.next_sequence(), 11);
    }
}
