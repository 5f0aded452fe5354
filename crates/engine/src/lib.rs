//! # Engine - LSM write path
//!
//! Ties the [`wal`], [`memtable`] and [`sstable`] crates into a single
//! session object.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ put/delete → build record                     │
//! │              |                                │
//! │              |  (buffer full?)                │
//! │              |        yes → flush()           │
//! │              v                                │
//! │           WAL append → buffer apply           │
//! │                                               │
//! │ flush() → data_dir/run-NNNNNN.{data,index,    │
//! │           summary,filter,meta}                │
//! │         → truncate WAL → fresh buffer         │
//! │                                               │
//! │ get → buffer only                             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                  |
//! |--------------|----------------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, constructor, accessors, `Debug`         |
//! | [`recovery`] | WAL replay into a fresh buffer, WAL rewrite              |
//! | [`write`]    | `put()`, `delete()`, `flush()`                           |
//! | [`runs`]     | Run naming, discovery on disk, verification              |
//!
//! ## Crash Safety
//!
//! Every mutation is appended to the WAL **before** it is applied to the
//! buffer, so an acknowledged write is always in the log. The WAL is only
//! truncated **after** all five files of a run have been written and synced.
//! A crash between the two leaves the records in both places; recovery then
//! writes them again as a newer run, which is harmless because runs are never
//! read back for lookups.
mod recovery;
mod runs;
mod write;

use anyhow::{Context, Result};
use config::Config;
use memtable::Memtable;
use std::path::PathBuf;
use wal::Wal;

pub use recovery::replay_wal;
pub use runs::{discover_runs, run_prefix};

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// One storage session: a write-ahead log, a bounded buffer, and the sorted
/// runs flushed so far.
///
/// # Write Path
///
/// 1. Build a timestamped record.
/// 2. If the buffer is full, flush it to a new run.
/// 3. Append the record to the WAL.
/// 4. Apply the record to the buffer.
///
/// # Recovery
///
/// On [`Engine::open`] the WAL is replayed into a fresh buffer and existing
/// runs are discovered in `data_dir` so new runs get higher generations.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) mem: Memtable,
    pub(crate) wal: Wal,
    /// Generations of the runs on disk, ascending.
    pub(crate) runs: Vec<u64>,
    pub(crate) next_generation: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("wal_path", &self.config.wal_path)
            .field("data_dir", &self.config.data_dir)
            .field("wal_sync", &self.config.wal_sync)
            .field("memtable_size", &self.mem.size())
            .field("memtable_capacity", &self.mem.capacity())
            .field("memtable_entries", &self.mem.len())
            .field("run_count", &self.runs.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl Engine {
    /// Opens a session, recovering whatever the last one left behind.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate the config and create `data_dir` if it does not exist.
    /// 2. Discover existing runs (`run-NNNNNN.meta`) to pick the next
    ///    generation.
    /// 3. Replay the WAL into a fresh buffer, flushing to new runs whenever
    ///    the buffer fills.
    /// 4. Open the WAL for appending.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data dir {}", config.data_dir.display())
        })?;

        let mut runs = discover_runs(&config.data_dir)?;
        let mut next_generation = runs.last().map_or(1, |g| g + 1);

        let mem = recovery::recover(&config, &mut runs, &mut next_generation)?;

        let wal = Wal::open(&config.wal_path, config.wal_sync)
            .with_context(|| format!("failed to open WAL {}", config.wal_path.display()))?;

        Ok(Self {
            config,
            mem,
            wal,
            runs,
            next_generation,
        })
    }

    /// Returns the latest value for `key` from the buffer. Flushed data is
    /// not consulted.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.mem.get(key)
    }

    pub fn memtable(&self) -> &Memtable {
        &self.mem
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generations of the runs on disk, oldest first.
    pub fn runs(&self) -> &[u64] {
        &self.runs
    }

    /// Path prefix of the run with the given generation.
    pub fn run_path(&self, generation: u64) -> PathBuf {
        run_prefix(&self.config.data_dir, generation)
    }

    /// Syncs the WAL and releases it. Buffered records stay in the log and
    /// are replayed by the next [`open`](Engine::open).
    pub fn close(self) -> Result<()> {
        self.wal.close().context("failed to close WAL")
    }
}

#[cfg(test)]
mod tests;
