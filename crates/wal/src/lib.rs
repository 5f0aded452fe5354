//! # WAL - Write-Ahead Log
//!
//! Provides crash-safe durability for the storage engine.
//!
//! Every mutation (put or delete) is encoded as a [`record::Record`] and
//! appended to the WAL **before** the corresponding in-memory update is
//! acknowledged. On restart the WAL is replayed to reconstruct the memtable
//! contents that had not yet been flushed to a sorted run.
//!
//! ## File Format
//!
//! The log is nothing more than encoded records laid end to end:
//!
//! ```text
//! [record 0][record 1][record 2] ...
//! ```
//!
//! See the `record` crate for the per-record layout. Records are never
//! rewritten in place; the file only grows until the engine truncates it
//! after a successful flush.
//!
//! ## Example
//!
//! ```rust,no_run
//! use record::Record;
//! use wal::Wal;
//!
//! let mut wal = Wal::open("wal.log", true).unwrap();
//! wal.append(&Record::put(b"hello".to_vec(), b"world".to_vec())).unwrap();
//! for rec in wal.replay().unwrap() {
//!     println!("{:?}", rec);
//! }
//! wal.close().unwrap();
//! ```

use record::{Record, RecordError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A failed append could not be rolled back; the log may end mid-record.
    #[error("wal is poisoned after a failed rollback")]
    Poisoned,
}

/// Outcome of a replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records handed to the caller.
    pub applied: usize,
    /// Records dropped because their checksum did not match.
    pub skipped: usize,
    /// `true` if replay stopped at a partially written record.
    pub truncated_tail: bool,
}

/// Append-only write-ahead log backed by a single file.
///
/// The file is opened for reading and appending. Reads always start from the
/// beginning of the file and never move the append position. When `sync` is
/// `true`, every append is followed by `sync_data()` so the record is on
/// stable storage before [`append`](Wal::append) returns.
///
/// The log always ends on a record boundary. A partial record left by a
/// crash is cut off in [`open`](Wal::open), and a failed append is rolled
/// back to the previous end. If that rollback fails too the `Wal` is
/// poisoned and refuses further appends.
pub struct Wal {
    file: File,
    path: PathBuf,
    sync: bool,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
    /// End of the last complete record.
    len: u64,
    poisoned: bool,
}

impl Wal {
    /// Opens (or creates) a WAL file.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the WAL (created if it does not exist).
    /// * `sync` - if true, every `append` call is followed by `fsync`.
    ///
    /// A partial record at the end of an existing log is truncated away so
    /// new appends start on a record boundary.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let len = complete_prefix_len(&file)?;
        if len < file_len {
            warn!(
                path = %path.display(),
                kept = len,
                dropped = file_len - len,
                "cutting partial record off the wal tail"
            );
            file.set_len(len)?;
            file.sync_all()?;
        }

        Ok(Self {
            file,
            path,
            sync,
            buf: Vec::with_capacity(256),
            len,
            poisoned: false,
        })
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes `record` and appends it to the end of the log.
    ///
    /// The whole record goes out in a single `write_all` call. A failed append
    /// never touches bytes that were already in the file: whatever part of
    /// the record reached the file is truncated away before the error is
    /// returned. Stray bytes found past the last complete record are cut
    /// off the same way before writing.
    ///
    /// # Errors
    ///
    /// Returns `WalError::Poisoned` once a rollback has failed.
    pub fn append(&mut self, record: &Record) -> Result<(), WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }

        let on_disk = self.file.metadata()?.len();
        if on_disk != self.len {
            warn!(
                path = %self.path.display(),
                expected = self.len,
                found = on_disk,
                "wal length changed outside of append, cutting back"
            );
            if on_disk < self.len {
                self.len = complete_prefix_len(&self.file)?;
            }
            self.rollback()?;
        }

        // Reuse the internal buffer; clear but keep the allocation
        self.buf.clear();
        record.encode_into(&mut self.buf);

        if let Err(e) = self.write_buf() {
            warn!(path = %self.path.display(), error = %e, "wal append failed, rolling back");
            self.rollback()?;
            return Err(e.into());
        }

        self.len += self.buf.len() as u64;
        Ok(())
    }

    fn write_buf(&mut self) -> io::Result<()> {
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cuts the file back to the end of the last complete record.
    fn rollback(&mut self) -> Result<(), WalError> {
        if let Err(e) = self.file.set_len(self.len) {
            self.poisoned = true;
            error!(
                path = %self.path.display(),
                error = %e,
                "wal rollback failed, refusing further appends"
            );
            return Err(WalError::Io(e));
        }
        Ok(())
    }

    /// Whether a failed rollback has disabled appends.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Forces all written data to disk via `sync_all()`.
    ///
    /// Useful when `sync` is `false` (batched mode) and the caller wants to
    /// ensure durability at a specific point.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Reads every valid record from the start of the log.
    ///
    /// Records with a bad checksum are skipped; a record cut short by the end
    /// of the file ends the replay. See [`WalReader::replay`].
    pub fn replay(&mut self) -> Result<Vec<Record>, WalError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = WalReader::from_reader(&mut self.file);
        let mut records = Vec::new();
        let stats = reader.replay(|r| records.push(r))?;
        debug!(
            path = %self.path.display(),
            applied = stats.applied,
            skipped = stats.skipped,
            truncated_tail = stats.truncated_tail,
            "wal replay finished"
        );
        Ok(records)
    }

    /// Discards every record in the log.
    ///
    /// Called by the engine once the records have been persisted in a sorted
    /// run, so a later replay does not resurrect them into the memtable.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Syncs and releases the file handle.
    pub fn close(mut self) -> Result<(), WalError> {
        self.sync_to_disk()
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .field("len", &self.len)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

/// Length of the longest prefix of `file` made of whole records.
///
/// Corrupt records still have a full length on disk and count towards the
/// prefix; only a record cut short by end of file is excluded.
fn complete_prefix_len(file: &File) -> Result<u64, WalError> {
    let mut rdr = BufReader::new(file);
    rdr.seek(SeekFrom::Start(0))?;
    loop {
        let start = rdr.stream_position()?;
        match Record::read_from(&mut rdr) {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(start),
            Err(RecordError::Truncated) => return Ok(start),
            Err(e) if e.is_corruption() => {}
            Err(RecordError::Io(e)) => return Err(WalError::Io(e)),
            Err(e) => {
                return Err(WalError::Io(io::Error::new(io::ErrorKind::InvalidData, e)));
            }
        }
    }
}

/// Sequential WAL reader that yields valid records.
///
/// The reader is generic over any `Read` implementor, allowing it to be used
/// with real files (`WalReader<File>`) or in-memory buffers for testing.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    ///
    /// Returns `WalError::Io` if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    ///
    /// Useful for unit tests that supply an in-memory buffer (e.g., `Cursor<Vec<u8>>`).
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record in the WAL, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (no more bytes) -> returns `Ok(stats)`.
    /// - **CRC mismatch** -> the record is dropped and replay continues with
    ///   the bytes that follow it.
    /// - **Truncated record** (declared lengths run past the end of the file,
    ///   e.g. a crash mid-write) -> returns `Ok(stats)` with everything read so
    ///   far. No attempt is made to resynchronize.
    /// - **I/O error** -> returns `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ReplayStats, WalError>
    where
        F: FnMut(Record),
    {
        let mut stats = ReplayStats::default();

        loop {
            match Record::read_from(&mut self.rdr) {
                Ok(Some(record)) => {
                    stats.applied += 1;
                    apply(record);
                }
                Ok(None) => return Ok(stats),
                Err(e) if e.is_corruption() => {
                    stats.skipped += 1;
                    warn!(
                        error = %e,
                        record = stats.applied + stats.skipped,
                        "skipping corrupt wal record"
                    );
                }
                Err(RecordError::Truncated) => {
                    stats.truncated_tail = true;
                    warn!(
                        applied = stats.applied,
                        "wal ends with a partial record, stopping replay"
                    );
                    return Ok(stats);
                }
                Err(RecordError::Io(e)) => return Err(WalError::Io(e)),
                Err(e) => {
                    return Err(WalError::Io(io::Error::new(io::ErrorKind::InvalidData, e)));
                }
            }
        }
    }
}
