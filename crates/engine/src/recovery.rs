/// WAL replay and WAL rewrite after a replay-time flush.
///
/// This module handles the cold-start path: reading every valid record out
/// of the WAL and rebuilding the write buffer from them.
use anyhow::{Context, Result};
use config::Config;
use memtable::Memtable;
use record::Record;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wal::{ReplayStats, Wal, WalError, WalReader};

use crate::runs::write_run;

/// Reads every valid record from the WAL at `path`, in log order.
///
/// A missing file is a fresh start and yields no records. Corrupt records
/// are skipped and a partial record at the tail ends the replay; both are
/// counted in the returned [`ReplayStats`].
pub fn replay_wal<P: AsRef<Path>>(path: P) -> Result<(Vec<Record>, ReplayStats)> {
    let mut reader = match WalReader::open(path.as_ref()) {
        Ok(reader) => reader,
        Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), ReplayStats::default()));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("failed to open WAL for replay")),
    };

    let mut records = Vec::new();
    let stats = reader
        .replay(|r| records.push(r))
        .context("failed to replay WAL")?;
    Ok((records, stats))
}

/// Rebuilds the write buffer from the WAL.
///
/// Records are applied with the same capacity rule as live writes. If the
/// buffer fills (possible when `memtable_max_size` was lowered since the log
/// was written) its contents are flushed to a new run and replay continues
/// with a fresh buffer. In that case the WAL is rewritten to hold only what
/// is still buffered, so the flushed records are not replayed again.
pub(crate) fn recover(
    config: &Config,
    runs: &mut Vec<u64>,
    next_generation: &mut u64,
) -> Result<Memtable> {
    cleanup_tmp_wal(&config.wal_path);

    let (records, stats) = replay_wal(&config.wal_path)?;
    let mut mem = Memtable::new(config.memtable_max_size);
    let mut flushed = 0usize;

    for record in records {
        if mem.is_full() {
            let generation = *next_generation;
            write_run(config, generation, &mem)?;
            runs.push(generation);
            *next_generation += 1;
            flushed += 1;
            mem = Memtable::new(config.memtable_max_size);
        }
        mem.apply(record)
            .context("failed to apply replayed record")?;
    }

    if flushed > 0 {
        rewrite_wal(&config.wal_path, &mem, config.wal_sync)?;
    }

    info!(
        applied = stats.applied,
        skipped = stats.skipped,
        truncated_tail = stats.truncated_tail,
        flushed_runs = flushed,
        buffered = mem.size(),
        "recovered from WAL"
    );
    Ok(mem)
}

fn tmp_wal_path(wal_path: &Path) -> PathBuf {
    let mut name = wal_path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Removes a leftover rewrite file from an interrupted recovery.
fn cleanup_tmp_wal(wal_path: &Path) {
    let tmp = tmp_wal_path(wal_path);
    if tmp.exists() {
        debug!(path = %tmp.display(), "removing leftover WAL rewrite");
        if let Err(e) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %e, "failed to remove leftover WAL rewrite");
        }
    }
}

/// Replaces the WAL with one holding exactly the buffered records.
///
/// The new log is written next to the old one and renamed over it, so a
/// crash leaves either the old or the new log in place.
fn rewrite_wal(wal_path: &Path, mem: &Memtable, sync: bool) -> Result<()> {
    let tmp = tmp_wal_path(wal_path);
    {
        let mut wal = Wal::open(&tmp, sync)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        for record in mem.snapshot().values() {
            wal.append(record)?;
        }
        wal.close()?;
    }
    fs::rename(&tmp, wal_path)
        .with_context(|| format!("failed to replace WAL {}", wal_path.display()))?;
    debug!(records = mem.len(), "rewrote WAL after replay flush");
    Ok(())
}
