//! Log reader for sequential replay
//!
//! Reads records in append order, validating frame structure, checksum, and
//! sequence monotonicity. On a torn or corrupt tail the reader reports the
//! corruption with the byte length of the valid prefix; everything before
//! that offset has already been handed out as complete records.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::errors::{WalError, WalResult};
use super::record::{LogRecord, MIN_RECORD_SIZE};

/// Sequential reader over a log file.
pub struct LogReader {
    reader: BufReader<File>,
    /// Offset of the next unread frame; only advances past complete records
    current_offset: u64,
    file_size: u64,
    last_sequence: u64,
}

impl LogReader {
    /// Opens a log file for replay.
    pub fn open(path: &Path) -> WalResult<Self> {
        let file = File::open(path).map_err(|source| WalError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file
            .metadata()
            .map_err(|source| WalError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        Ok(Self {
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_sequence: 0,
        })
    }

    /// Byte offset at which the verified prefix of the file ends.
    pub fn valid_offset(&self) -> u64 {
        self.current_offset
    }

    /// Sequence number of the last successfully read record (0 if none).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file. Returns
    /// `WalError::Corruption` when the remaining bytes do not form a complete
    /// valid record; `valid_offset()` then marks where salvage should stop.
    pub fn read_next(&mut self) -> WalResult<Option<LogRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            return Err(WalError::corruption(
                self.current_offset,
                format!(
                    "truncated tail: {} bytes remaining, minimum record size is {}",
                    remaining, MIN_RECORD_SIZE
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf)?;
        let frame_len = u32::from_le_bytes(len_buf) as u64;

        if frame_len < MIN_RECORD_SIZE as u64 {
            return Err(WalError::corruption(
                self.current_offset,
                format!("invalid record length {}", frame_len),
            ));
        }
        if frame_len > remaining {
            return Err(WalError::corruption(
                self.current_offset,
                format!(
                    "record length {} exceeds remaining {} bytes",
                    frame_len, remaining
                ),
            ));
        }

        let mut frame = vec![0u8; frame_len as usize];
        frame[..4].copy_from_slice(&len_buf);
        self.read_exact(&mut frame[4..])?;

        let record = LogRecord::decode(&frame, self.current_offset)?;

        if record.sequence <= self.last_sequence {
            return Err(WalError::corruption(
                self.current_offset,
                format!(
                    "sequence {} is not above previous {}",
                    record.sequence, self.last_sequence
                ),
            ));
        }

        self.last_sequence = record.sequence;
        self.current_offset += frame_len;
        Ok(Some(record))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> WalResult<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                WalError::corruption(self.current_offset, "unexpected end of file mid-record")
            } else {
                WalError::Append(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{log_path, LogWriter, RecordType};
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn write_records(dir: &Path, count: u64) {
        let mut writer = LogWriter::open(dir).unwrap();
        for i in 1..=count {
            writer
                .append(RecordType::Set, format!("k{}", i).as_bytes(), b"v")
                .unwrap();
        }
    }

    #[test]
    fn reads_back_records_in_order() {
        let dir = TempDir::new().unwrap();
        write_records(dir.path(), 5);

        let mut reader = LogReader::open(&log_path(dir.path())).unwrap();
        let mut sequences = Vec::new();
        while let Some(record) = reader.read_next().unwrap() {
            sequences.push(record.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn torn_tail_reports_corruption_after_valid_prefix() {
        let dir = TempDir::new().unwrap();
        write_records(dir.path(), 3);
        let path = log_path(dir.path());

        // Chop bytes off the last record to simulate a crash mid-write
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let mut reader = LogReader::open(&path).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        assert!(reader.read_next().unwrap().is_some());
        let err = reader.read_next().unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(reader.last_sequence(), 2);
        assert!(reader.valid_offset() < len - 3);
    }

    #[test]
    fn empty_log_yields_no_records() {
        let dir = TempDir::new().unwrap();
        write_records(dir.path(), 0);

        let mut reader = LogReader::open(&log_path(dir.path())).unwrap();
        assert!(reader.read_next().unwrap().is_none());
        assert_eq!(reader.valid_offset(), 0);
    }
}
