//! # Record - the on-disk / on-log key-value record
//!
//! Every mutation accepted by the engine is captured as a [`Record`]. The same
//! byte layout is used by the write-ahead log and by the `.data` file of a
//! sorted run, so a record written by either can be read back by the other.
//!
//! ## Binary Record Format
//!
//! ```text
//! [crc32: u32 LE][timestamp: i64 LE][tombstone: u8]
//! [key_size: u64 LE][value_size: u64 LE][key ...][value ...]
//! ```
//!
//! The CRC32 (IEEE) covers everything after itself. There is no version
//! field; the layout is fixed.
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//!
//! let rec = Record::new(1_700_000_000, false, b"hello".to_vec(), b"world".to_vec());
//! let bytes = rec.encode();
//! assert_eq!(Record::decode(&bytes).unwrap(), rec);
//! ```

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Size of the checksum prefix.
pub const CRC_BYTES: usize = 4;

/// Size of the fixed fields covered by the checksum:
/// timestamp (8) + tombstone (1) + key_size (8) + value_size (8).
pub const FIXED_BYTES: usize = 8 + 1 + 8 + 8;

/// Size of a record with an empty key and an empty value.
pub const HEADER_BYTES: usize = CRC_BYTES + FIXED_BYTES;

/// Errors produced while decoding a record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The stored checksum does not match the recomputed one.
    #[error("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The input ended in the middle of a record.
    #[error("truncated record")]
    Truncated,

    /// The checksum matched but the fields are inconsistent.
    #[error("malformed record: {0}")]
    Malformed(&'static str),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl RecordError {
    /// Returns `true` if the error is confined to a single, fully consumed
    /// record. Sequential readers may skip such a record and keep going.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RecordError::ChecksumMismatch { .. } | RecordError::Malformed(_)
        )
    }
}

/// A single key-value record, or a tombstone marking a deleted key.
///
/// Records are immutable: the checksum is computed once at construction and
/// the fields are only exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    checksum: u32,
    timestamp: i64,
    tombstone: bool,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Record {
    /// Builds a record and computes its checksum.
    ///
    /// A tombstone never carries a value; `value` is dropped when
    /// `tombstone` is set.
    pub fn new(timestamp: i64, tombstone: bool, key: Vec<u8>, mut value: Vec<u8>) -> Self {
        if tombstone {
            value.clear();
        }
        let checksum = checksum_of(timestamp, tombstone, &key, &value);
        Self {
            checksum,
            timestamp,
            tombstone,
            key,
            value,
        }
    }

    /// A live record stamped with the current wall-clock time.
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::new(now_secs(), false, key, value)
    }

    /// A tombstone stamped with the current wall-clock time. Tombstones
    /// always carry an empty value.
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self::new(now_secs(), true, key, Vec::new())
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Creation time in seconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[must_use]
    pub fn key_size(&self) -> u64 {
        self.key.len() as u64
    }

    #[must_use]
    pub fn value_size(&self) -> u64 {
        self.value.len() as u64
    }

    /// Number of bytes [`encode`](Record::encode) produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_BYTES + self.key.len() + self.value.len()
    }

    /// Consumes the record, returning `(key, value)`.
    pub fn into_key_value(self) -> (Vec<u8>, Vec<u8>) {
        (self.key, self.value)
    }

    /// Serializes the record into a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the serialized record to `buf`.
    ///
    /// The checksum is taken from the record itself, so a record decoded from
    /// disk re-encodes to exactly the bytes it was read from.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        write_fixed(buf, self.timestamp, self.tombstone, &self.key, &self.value);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
    }

    /// Decodes exactly one record from `bytes`.
    ///
    /// The checksum is verified over the whole slice before any length field
    /// is trusted, so a damaged length is reported as a checksum mismatch
    /// rather than a short read.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < HEADER_BYTES {
            return Err(RecordError::Truncated);
        }
        let expected = LittleEndian::read_u32(&bytes[..CRC_BYTES]);
        let body = &bytes[CRC_BYTES..];

        let mut hasher = Crc32::new();
        hasher.update(body);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(RecordError::ChecksumMismatch { expected, actual });
        }

        let (timestamp, tombstone, key_size, value_size) = parse_fixed(&body[..FIXED_BYTES])?;
        let payload = &body[FIXED_BYTES..];
        if key_size.checked_add(value_size) != Some(payload.len() as u64) {
            return Err(RecordError::Malformed("declared sizes do not match record length"));
        }
        if tombstone && value_size != 0 {
            return Err(RecordError::Malformed("tombstone carries a value"));
        }
        let (key, value) = payload.split_at(key_size as usize);

        Ok(Self {
            checksum: expected,
            timestamp,
            tombstone,
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Reads the next record from a byte stream.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (no bytes before the next record) -> `Ok(None)`.
    /// - **Premature EOF** inside a record -> `Err(RecordError::Truncated)`.
    /// - **CRC mismatch** -> `Err(RecordError::ChecksumMismatch)`. The whole
    ///   record has been consumed, so the stream is positioned at the next one.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>, RecordError> {
        let mut crc_buf = [0u8; CRC_BYTES];
        match read_fully(r, &mut crc_buf)? {
            0 => return Ok(None),
            CRC_BYTES => {}
            _ => return Err(RecordError::Truncated),
        }
        let expected = u32::from_le_bytes(crc_buf);

        let mut fixed = [0u8; FIXED_BYTES];
        read_exact_or_truncated(r, &mut fixed)?;
        let (timestamp, tombstone_byte, key_size, value_size) = parse_fixed_raw(&fixed);

        // A corrupted length may be enormous; `take` keeps the allocation
        // bounded by what the stream actually holds.
        let payload_len = key_size
            .checked_add(value_size)
            .ok_or(RecordError::Truncated)?;
        let mut payload = Vec::new();
        r.by_ref().take(payload_len).read_to_end(&mut payload)?;
        if payload.len() as u64 != payload_len {
            return Err(RecordError::Truncated);
        }

        let mut hasher = Crc32::new();
        hasher.update(&fixed);
        hasher.update(&payload);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(RecordError::ChecksumMismatch { expected, actual });
        }

        let tombstone = tombstone_flag(tombstone_byte)?;
        if tombstone && value_size != 0 {
            return Err(RecordError::Malformed("tombstone carries a value"));
        }
        let value = payload.split_off(key_size as usize);

        Ok(Some(Self {
            checksum: expected,
            timestamp,
            tombstone,
            key: payload,
            value,
        }))
    }
}

/// Current wall-clock time in whole seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn checksum_of(timestamp: i64, tombstone: bool, key: &[u8], value: &[u8]) -> u32 {
    let mut fixed = Vec::with_capacity(FIXED_BYTES);
    write_fixed(&mut fixed, timestamp, tombstone, key, value);

    let mut hasher = Crc32::new();
    hasher.update(&fixed);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

fn write_fixed(buf: &mut Vec<u8>, timestamp: i64, tombstone: bool, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.push(u8::from(tombstone));
    buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
}

/// Splits the fixed fields. `fixed` must be exactly `FIXED_BYTES` long.
fn parse_fixed_raw(fixed: &[u8]) -> (i64, u8, u64, u64) {
    let timestamp = LittleEndian::read_i64(&fixed[0..8]);
    let tombstone = fixed[8];
    let key_size = LittleEndian::read_u64(&fixed[9..17]);
    let value_size = LittleEndian::read_u64(&fixed[17..25]);
    (timestamp, tombstone, key_size, value_size)
}

fn parse_fixed(fixed: &[u8]) -> Result<(i64, bool, u64, u64), RecordError> {
    let (timestamp, tombstone, key_size, value_size) = parse_fixed_raw(fixed);
    Ok((timestamp, tombstone_flag(tombstone)?, key_size, value_size))
}

fn tombstone_flag(byte: u8) -> Result<bool, RecordError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(RecordError::Malformed("tombstone flag is neither 0 nor 1")),
    }
}

/// Fills `buf` as far as the stream allows, returning the number of bytes read.
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), RecordError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(RecordError::Truncated),
        Err(e) => Err(RecordError::Io(e)),
    }
}

#[cfg(test)]
mod tests;
