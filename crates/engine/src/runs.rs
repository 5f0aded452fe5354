/// Sorted runs on disk: naming, discovery and verification.
///
/// Run `N` lives at `data_dir/run-NNNNNN.*` (six digits, zero padded). The
/// `.meta` file is written last, so a run counts as present only once its
/// `.meta` file exists.
use anyhow::{Context, Result};
use config::Config;
use memtable::Memtable;
use sstable::{RunInfo, SSTableError, SSTableWriter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Engine;

const RUN_PREFIX: &str = "run-";
const META_SUFFIX: &str = ".meta";

/// Path prefix for the run with the given generation.
pub fn run_prefix<P: AsRef<Path>>(data_dir: P, generation: u64) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}{:06}", RUN_PREFIX, generation))
}

/// Lists the generations of the complete runs in `data_dir`, ascending.
pub fn discover_runs<P: AsRef<Path>>(data_dir: P) -> Result<Vec<u64>> {
    let data_dir = data_dir.as_ref();
    let mut generations: Vec<u64> = fs::read_dir(data_dir)
        .with_context(|| format!("failed to list {}", data_dir.display()))?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(parse_generation))
        .collect();
    generations.sort_unstable();
    Ok(generations)
}

fn parse_generation(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(RUN_PREFIX)?.strip_suffix(META_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Writes the buffer's contents as run `generation`.
pub(crate) fn write_run(config: &Config, generation: u64, mem: &Memtable) -> Result<RunInfo> {
    let prefix = run_prefix(&config.data_dir, generation);
    let records = mem.snapshot().into_values();
    let info = SSTableWriter::flush(&prefix, records, &config.run_options())
        .with_context(|| format!("failed to write run {}", prefix.display()))?;
    info!(
        generation,
        records = info.records,
        data_bytes = info.data_bytes,
        "wrote run"
    );
    Ok(info)
}

impl Engine {
    /// Checks the integrity root of run `generation`.
    pub fn verify(&self, generation: u64) -> Result<(), SSTableError> {
        sstable::verify(self.run_path(generation))
    }

    /// Verifies every known run, oldest first.
    pub fn verify_all(&self) -> Vec<(u64, Result<(), SSTableError>)> {
        self.runs
            .iter()
            .map(|&generation| (generation, self.verify(generation)))
            .collect()
    }
}
