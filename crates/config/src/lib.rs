//! # Config - engine settings
//!
//! Every tunable the engine uses lives in one [`Config`] value that is
//! passed explicitly to the components that need it. Nothing reads global
//! state after startup.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A JSON file ([`Config::load`]). Missing fields keep their defaults and
//!    unknown fields are ignored, so older files keep working.
//! 3. `LSMKV_*` environment variables ([`Config::with_env_overrides`]).
//!
//! ```text
//! LSMKV_MEMTABLE_MAX_SIZE  mutations accepted before a flush   (default: 1000)
//! LSMKV_SUMMARY_STEP       index entries per summary entry     (default: 5)
//! LSMKV_BLOOM_BYTES        bloom filter size in bytes          (default: 1024)
//! LSMKV_BLOOM_HASHES       bloom hash functions                (default: 3)
//! LSMKV_WAL_SYNC           fsync every WAL append              (default: true)
//! LSMKV_WAL_PATH           WAL file path                       (default: "wal.log")
//! LSMKV_DATA_DIR           directory holding sorted runs       (default: "data")
//! ```

use serde::{Deserialize, Serialize};
use sstable::RunOptions;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mutations the write buffer accepts before it must be flushed.
    pub memtable_max_size: usize,
    pub summary_step: usize,
    pub bloom_bytes: usize,
    pub bloom_hashes: u32,
    pub wal_sync: bool,
    pub wal_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memtable_max_size: 1000,
            summary_step: 5,
            bloom_bytes: 1024,
            bloom_hashes: 3,
            wal_sync: true,
            wal_path: PathBuf::from("wal.log"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Reads `path` as JSON on top of the defaults.
    ///
    /// A missing file is not an error: the defaults are returned. A file that
    /// exists but cannot be parsed is [`ConfigError::Parse`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `LSMKV_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by variable name. An unset variable
    /// leaves the field alone; a value that does not parse is an error.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "LSMKV_MEMTABLE_MAX_SIZE", &mut self.memtable_max_size)?;
        override_parsed(&lookup, "LSMKV_SUMMARY_STEP", &mut self.summary_step)?;
        override_parsed(&lookup, "LSMKV_BLOOM_BYTES", &mut self.bloom_bytes)?;
        override_parsed(&lookup, "LSMKV_BLOOM_HASHES", &mut self.bloom_hashes)?;
        override_parsed(&lookup, "LSMKV_WAL_SYNC", &mut self.wal_sync)?;
        if let Some(v) = lookup("LSMKV_WAL_PATH") {
            self.wal_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LSMKV_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        Ok(self)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memtable_max_size == 0 {
            return Err(ConfigError::Invalid("memtable_max_size must be > 0"));
        }
        if self.summary_step == 0 {
            return Err(ConfigError::Invalid("summary_step must be > 0"));
        }
        if self.bloom_bytes == 0 {
            return Err(ConfigError::Invalid("bloom_bytes must be > 0"));
        }
        if self.bloom_hashes == 0 {
            return Err(ConfigError::Invalid("bloom_hashes must be > 0"));
        }
        Ok(())
    }

    /// The subset of settings a flush needs.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            summary_step: self.summary_step,
            bloom_bytes: self.bloom_bytes,
            bloom_hashes: self.bloom_hashes,
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }
    Ok(())
}
