//! Tiered/overflow storage
//!
//! With tiered storage enabled, values at or above the configured threshold
//! are written to an append-only overflow file and the in-memory map keeps
//! only an offset/length pointer. Durability does not depend on this file:
//! the log and checkpoints hold the full values, and recovery re-spills them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

/// Overflow file name inside the overflow directory.
const OVERFLOW_FILE_NAME: &str = "values.dat";

/// Location of a spilled value inside the overflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    pub offset: u64,
    pub len: u32,
}

/// Append-only value file for the overflow tier.
///
/// Old offsets stay valid forever within a process lifetime, so readers can
/// resolve a `ValueRef` without coordinating with writers beyond the file
/// handle lock.
#[derive(Debug)]
pub struct OverflowStore {
    file: Mutex<File>,
    end: Mutex<u64>,
}

impl OverflowStore {
    /// Opens or creates the overflow file inside `dir`.
    ///
    /// Stale contents from a previous run are discarded; the map that pointed
    /// into them is rebuilt from checkpoint + log anyway.
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(OVERFLOW_FILE_NAME))?;
        Ok(Self {
            file: Mutex::new(file),
            end: Mutex::new(0),
        })
    }

    /// Appends a value, returning its location.
    pub fn append(&self, value: &[u8]) -> io::Result<ValueRef> {
        let mut end = self.end.lock();
        let offset = *end;
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(value)?;
        }
        *end += value.len() as u64;
        Ok(ValueRef {
            offset,
            len: value.len() as u32,
        })
    }

    /// Reads a previously appended value.
    pub fn read(&self, value_ref: ValueRef) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; value_ref.len as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(value_ref.offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appended_values_read_back() {
        let dir = TempDir::new().unwrap();
        let store = OverflowStore::open(dir.path()).unwrap();

        let a = store.append(b"first value").unwrap();
        let b = store.append(b"second, longer value").unwrap();

        assert_eq!(store.read(a).unwrap(), b"first value");
        assert_eq!(store.read(b).unwrap(), b"second, longer value");
        assert_eq!(b.offset, a.len as u64);
    }

    #[test]
    fn reopen_discards_stale_contents() {
        let dir = TempDir::new().unwrap();
        {
            let store = OverflowStore::open(dir.path()).unwrap();
            store.append(b"doomed").unwrap();
        }
        let store = OverflowStore::open(dir.path()).unwrap();
        let fresh = store.append(b"fresh").unwrap();
        assert_eq!(fresh.offset, 0);
    }
}
