//! On-disk layout of a sorted run.
//!
//! A run is five sibling files sharing a prefix:
//!
//! ```text
//! <prefix>.data     records sorted by key, encoded exactly like WAL records
//! <prefix>.index    one entry per record: key_size(u64 LE) | key | offset(u64 LE)
//! <prefix>.summary  every Nth index entry, same encoding as .index
//! <prefix>.filter   raw bloom filter bitset
//! <prefix>.meta     32-byte SHA-256 root of the integrity tree over the values
//! ```
//!
//! `offset` in both `.index` and `.summary` is the byte position in `.data`
//! where the record for `key` begins.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::SSTableError;

/// Paths of the five files that make up one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub data: PathBuf,
    pub index: PathBuf,
    pub summary: PathBuf,
    pub filter: PathBuf,
    pub meta: PathBuf,
}

impl RunPaths {
    /// Derives the file paths by appending each extension to `prefix`.
    ///
    /// The extension is appended, not substituted, so a prefix such as
    /// `data/run-000001` keeps its full file stem.
    pub fn new<P: AsRef<Path>>(prefix: P) -> Self {
        let prefix = prefix.as_ref();
        Self {
            data: with_suffix(prefix, "data"),
            index: with_suffix(prefix, "index"),
            summary: with_suffix(prefix, "summary"),
            filter: with_suffix(prefix, "filter"),
            meta: with_suffix(prefix, "meta"),
        }
    }

    pub fn all(&self) -> [&Path; 5] {
        [
            &self.data,
            &self.index,
            &self.summary,
            &self.filter,
            &self.meta,
        ]
    }

    /// `true` when every file of the run is present.
    pub fn exists(&self) -> bool {
        self.all().iter().all(|p| p.is_file())
    }
}

fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// One `.index` / `.summary` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u64,
}

impl IndexEntry {
    pub fn new(key: Vec<u8>, offset: u64) -> Self {
        Self { key, offset }
    }

    /// Encoded size: two u64 fields plus the key.
    pub fn encoded_len(&self) -> usize {
        8 + self.key.len() + 8
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.key.len() as u64)?;
        w.write_all(&self.key)?;
        w.write_u64::<LittleEndian>(self.offset)?;
        Ok(())
    }

    /// Reads the next entry. Returns `Ok(None)` on a clean EOF between
    /// entries and [`SSTableError::CorruptIndex`] if the stream ends inside
    /// one.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>, SSTableError> {
        let mut len_buf = [0u8; 8];
        match read_up_to(r, &mut len_buf)? {
            0 => return Ok(None),
            8 => {}
            _ => return Err(SSTableError::CorruptIndex("truncated key size")),
        }
        let key_size = LittleEndian::read_u64(&len_buf);

        // `take` bounds the allocation by what the stream actually holds.
        let mut key = Vec::new();
        (&mut *r).take(key_size).read_to_end(&mut key)?;
        if key.len() as u64 != key_size {
            return Err(SSTableError::CorruptIndex("truncated key"));
        }

        let mut off_buf = [0u8; 8];
        if read_up_to(r, &mut off_buf)? != 8 {
            return Err(SSTableError::CorruptIndex("truncated offset"));
        }
        Ok(Some(Self {
            key,
            offset: LittleEndian::read_u64(&off_buf),
        }))
    }
}

/// Reads every entry of an `.index` or `.summary` file in file order.
pub fn read_index_file<P: AsRef<Path>>(path: P) -> Result<Vec<IndexEntry>, SSTableError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    while let Some(entry) = IndexEntry::read_from(&mut reader)? {
        entries.push(entry);
    }
    Ok(entries)
}

fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
