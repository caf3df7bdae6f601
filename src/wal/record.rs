//! Log record types and encoding
//!
//! A record describes exactly one mutation. Records are encoded with a
//! length-prefixed frame and a trailing CRC32 so that a partially written
//! tail is detectable on replay.

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{WalError, WalResult};

/// Fixed overhead of an encoded record: length (4) + type (1) + sequence (8)
/// + key length (4) + value length (4) + checksum (4).
pub const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 4 + 4 + 4;

/// Mutation kinds that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Store a value under a key (insert or overwrite)
    Set = 0,
    /// Remove a key (tombstone)
    Delete = 1,
}

impl RecordType {
    /// Convert from u8, returns None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordType::Set),
            1 => Some(RecordType::Delete),
            _ => None,
        }
    }

    /// Convert to u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One mutation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Sequence number, strictly increasing across the store's lifetime
    pub sequence: u64,
    /// Mutation kind
    pub record_type: RecordType,
    /// Key bytes
    pub key: Vec<u8>,
    /// Value bytes; empty for `Delete`
    pub value: Vec<u8>,
}

impl LogRecord {
    /// Create a `Set` record.
    pub fn set(sequence: u64, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            sequence,
            record_type: RecordType::Set,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a `Delete` record.
    pub fn delete(sequence: u64, key: impl Into<Vec<u8>>) -> Self {
        Self {
            sequence,
            record_type: RecordType::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Total encoded size in bytes, including the length field itself.
    pub fn encoded_len(&self) -> usize {
        MIN_RECORD_SIZE + self.key.len() + self.value.len()
    }

    /// Encode the record into its on-disk frame.
    pub fn encode(&self) -> Vec<u8> {
        let total = self.encoded_len();
        let mut buf = Vec::with_capacity(total);

        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.push(self.record_type.as_u8());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);

        // Checksum covers everything between the length field and itself
        let crc = compute_checksum(&buf[4..]);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decode a record from a full frame (including the 4-byte length field).
    ///
    /// `offset` is only used for error reporting and names the frame start.
    pub fn decode(frame: &[u8], offset: u64) -> WalResult<Self> {
        if frame.len() < MIN_RECORD_SIZE {
            return Err(WalError::corruption(
                offset,
                format!("frame of {} bytes is below minimum record size", frame.len()),
            ));
        }

        let body = &frame[4..frame.len() - 4];
        let crc_bytes: [u8; 4] = frame[frame.len() - 4..].try_into().expect("4-byte slice");
        let expected_crc = u32::from_le_bytes(crc_bytes);
        if !verify_checksum(body, expected_crc) {
            return Err(WalError::corruption(offset, "record checksum mismatch"));
        }

        let record_type = RecordType::from_u8(body[0]).ok_or_else(|| {
            WalError::corruption(offset, format!("unknown record type {}", body[0]))
        })?;

        let sequence = u64::from_le_bytes(body[1..9].try_into().expect("8-byte slice"));

        let key_len = u32::from_le_bytes(body[9..13].try_into().expect("4-byte slice")) as usize;
        let key_end = 13 + key_len;
        if body.len() < key_end + 4 {
            return Err(WalError::corruption(offset, "key length exceeds record body"));
        }
        let key = body[13..key_end].to_vec();

        let value_len = u32::from_le_bytes(
            body[key_end..key_end + 4].try_into().expect("4-byte slice"),
        ) as usize;
        let value_start = key_end + 4;
        if body.len() != value_start + value_len {
            return Err(WalError::corruption(
                offset,
                "value length does not match record body",
            ));
        }
        let value = body[value_start..].to_vec();

        Ok(Self {
            sequence,
            record_type,
            key,
            value,
        })
    }
}
