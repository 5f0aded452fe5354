//! # SSTable - sorted runs
//!
//! When the write buffer fills up, the engine flushes its contents to disk
//! as a sorted run. Runs are *write-once*: nothing in the engine modifies a
//! run after [`SSTableWriter::flush`] returns, and nothing reads keys back
//! out of one. What a run offers is durability plus an integrity check:
//! [`verify`] rebuilds the SHA-256 tree over the stored values and compares
//! it with the root saved at write time.
//!
//! ## Files
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────────────────────┐
//! │ .data        │ crc32 | ts | tombstone | key_size | value_size      │
//! │              │ | key | value    (one record per key, sorted)        │
//! ├──────────────┼─────────────────────────────────────────────────────┤
//! │ .index       │ key_size (u64) | key | data offset (u64)            │
//! ├──────────────┼─────────────────────────────────────────────────────┤
//! │ .summary     │ every Nth .index entry, starting at the first       │
//! ├──────────────┼─────────────────────────────────────────────────────┤
//! │ .filter      │ raw bloom filter bits                               │
//! ├──────────────┼─────────────────────────────────────────────────────┤
//! │ .meta        │ 32-byte integrity tree root                         │
//! └──────────────┴─────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

mod format;
mod verify;
mod writer;

pub use format::{read_index_file, IndexEntry, RunPaths};
pub use verify::verify;
pub use writer::SSTableWriter;

use merkle::Digest;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SSTableError {
    #[error("invalid run options: {0}")]
    InvalidOptions(&'static str),

    #[error("refusing to write an empty run")]
    EmptyRun,

    /// The root rebuilt from `.data` differs from the one in `.meta`.
    #[error("integrity check failed: stored root {expected}, computed {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("corrupt index file: {0}")]
    CorruptIndex(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Tunables for a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Every `summary_step`-th index entry is copied into `.summary`.
    pub summary_step: usize,
    /// Size of the bloom filter bitset in bytes.
    pub bloom_bytes: usize,
    /// Number of bloom hash functions.
    pub bloom_hashes: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            summary_step: 5,
            bloom_bytes: 1024,
            bloom_hashes: 3,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), SSTableError> {
        if self.summary_step == 0 {
            return Err(SSTableError::InvalidOptions("summary_step must be > 0"));
        }
        if self.bloom_bytes == 0 {
            return Err(SSTableError::InvalidOptions("bloom_bytes must be > 0"));
        }
        if self.bloom_hashes == 0 {
            return Err(SSTableError::InvalidOptions("bloom_hashes must be > 0"));
        }
        Ok(())
    }
}

/// What a successful flush wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub records: usize,
    /// Length of `.data`.
    pub data_bytes: u64,
    pub index_entries: usize,
    pub summary_entries: usize,
    pub root: Digest,
}

#[cfg(test)]
mod tests;
