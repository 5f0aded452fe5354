/// Write path: `put()`, `delete()` and `flush()`.
///
/// All mutations flow through [`Engine::commit`]: the record is logged to
/// the WAL and only then applied to the buffer. A full buffer is flushed
/// before the record is logged, never after.
use anyhow::{Context, Result};
use memtable::Memtable;
use record::Record;
use sstable::RunInfo;
use tracing::debug;

use crate::runs::write_run;
use crate::{Engine, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Engine {
    /// Stores `value` under `key`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        check_key(&key)?;
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );
        self.commit(Record::put(key, value))
    }

    /// Deletes `key` by writing a tombstone.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        check_key(&key)?;
        self.commit(Record::tombstone(key))
    }

    fn commit(&mut self, record: Record) -> Result<()> {
        if self.mem.is_full() {
            debug!(size = self.mem.size(), "buffer full, flushing before write");
            self.flush()?;
        }

        self.wal
            .append(&record)
            .context("failed to append to WAL")?;

        self.mem
            .apply(record)
            .context("failed to apply record to buffer")?;
        Ok(())
    }

    /// Writes the buffer to a new run, truncates the WAL and starts a fresh
    /// buffer.
    ///
    /// Returns `Ok(None)` without touching anything when the buffer is
    /// empty.
    ///
    /// # Steps
    ///
    /// 1. Snapshot the buffer and write run `data_dir/run-NNNNNN`.
    /// 2. Truncate the WAL to zero bytes.
    /// 3. Replace the buffer with an empty one.
    ///
    /// If step 1 fails the WAL and buffer are left as they were, so the
    /// records are neither lost nor acknowledged twice.
    pub fn flush(&mut self) -> Result<Option<RunInfo>> {
        if self.mem.is_empty() {
            return Ok(None);
        }

        let generation = self.next_generation;
        let info = write_run(&self.config, generation, &self.mem)?;
        self.runs.push(generation);
        self.next_generation += 1;

        self.wal.truncate().context("failed to truncate WAL")?;
        self.mem = Memtable::new(self.config.memtable_max_size);

        Ok(Some(info))
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    anyhow::ensure!(!key.is_empty(), "key must not be empty");
    anyhow::ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key too large: {} bytes (max {})",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}
