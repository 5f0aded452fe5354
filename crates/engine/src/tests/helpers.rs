use config::Config;
use std::fs;
use std::path::Path;

/// Config rooted in `dir` with the given buffer capacity.
pub fn test_config(dir: &Path, capacity: usize) -> Config {
    Config {
        memtable_max_size: capacity,
        wal_path: dir.join("wal.log"),
        data_dir: dir.join("data"),
        ..Config::default()
    }
}

pub fn count_files_with_ext(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|x| x == ext)
                .unwrap_or(false)
        })
        .count()
}

pub fn kv(i: usize) -> (Vec<u8>, Vec<u8>) {
    (
        format!("key{:03}", i).into_bytes(),
        format!("value{}", i).into_bytes(),
    )
}
