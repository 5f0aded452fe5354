/// End-to-end tests driving the `cli` binary through stdin.
/// Covers: basic ops, flushes, verification, index output, recovery, config.
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::tempdir;

/// Runs the shell with `commands` on stdin (followed by EXIT) and returns stdout.
fn run_cli(dir: &Path, envs: &[(&str, &str)], commands: &str) -> String {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cli"));
    cmd.current_dir(dir)
        .env("LSMKV_CONFIG", dir.join("config.json"))
        .env("LSMKV_WAL_PATH", dir.join("wal.log"))
        .env("LSMKV_DATA_DIR", dir.join("data"))
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().expect("Failed to spawn CLI");
    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(commands.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    assert!(output.status.success(), "cli exited with {:?}", output.status);
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn count_with_ext(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(ext))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), &[], "PUT key1 value1\nGET key1\n");

    assert!(output.contains("lsmkv started"));
    assert!(output.contains("OK"));
    assert!(output.contains("value1"));
    assert!(output.contains("bye"));
}

#[test]
fn test_value_with_spaces() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), &[], "PUT msg hello there world\nGET msg\n");
    assert!(output.contains("hello there world"));
}

#[test]
fn test_delete_key() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), &[], "PUT k v\nDELETE k\nGET k\n");
    assert!(output.contains("(nil)"));
}

#[test]
fn test_flush_writes_run_files() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), &[], "PUT a 1\nPUT b 2\nFLUSH\n");

    assert!(output.contains("OK (run 1, 2 records)"));
    let data = dir.path().join("data");
    for ext in ["data", "index", "summary", "filter", "meta"] {
        assert_eq!(count_with_ext(&data, ext), 1, "missing .{} file", ext);
    }
    assert_eq!(fs::metadata(dir.path().join("wal.log")).unwrap().len(), 0);
}

#[test]
fn test_auto_flush_on_capacity() {
    let dir = tempdir().unwrap();
    let commands: String = (0..7).map(|i| format!("PUT k{} v{}\n", i, i)).collect();
    run_cli(dir.path(), &[("LSMKV_MEMTABLE_MAX_SIZE", "3")], &commands);

    // 7 writes with capacity 3: flushes before the 4th and 7th write.
    assert_eq!(count_with_ext(&dir.path().join("data"), "meta"), 2);
}

#[test]
fn test_verify_and_index() {
    let dir = tempdir().unwrap();
    let output = run_cli(
        dir.path(),
        &[],
        "PUT b 2\nPUT a 1\nPUT c 3\nFLUSH\nVERIFY\nINDEX\n",
    );

    assert!(output.contains("run 1: OK"));
    assert!(output.contains("a -> 0"));
    assert!(output.contains("(3 entries)"));
}

#[test]
fn test_verify_detects_tampering() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), &[], "PUT a apple\nPUT b banana\nFLUSH\n");

    let data = dir.path().join("data").join("run-000001.data");
    let mut bytes = fs::read(&data).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x20;
    fs::write(&data, bytes).unwrap();

    let output = run_cli(dir.path(), &[], "VERIFY\n");
    assert!(output.contains("run 1: FAILED"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), &[], "PUT persist yes\nDELETE gone\n");

    let output = run_cli(dir.path(), &[], "GET persist\nGET gone\n");
    assert!(output.contains("yes"));
    assert!(output.contains("(nil)"));
}

#[test]
fn test_generations_continue_after_restart() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), &[], "PUT a 1\nFLUSH\n");
    let output = run_cli(dir.path(), &[], "PUT b 2\nFLUSH\n");

    assert!(output.contains("runs=1"));
    assert!(output.contains("OK (run 2, 1 records)"));
}

#[test]
fn test_config_file_is_used() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{ "memtable_max_size": 2, "summary_step": 1 }"#,
    )
    .unwrap();

    let output = run_cli(dir.path(), &[], "PUT a 1\nPUT b 2\nPUT c 3\nSUMMARY 1\n");
    assert!(output.contains("capacity=2"));
    // summary_step 1 copies every index entry.
    assert!(output.contains("(2 entries)"));
}

#[test]
fn test_bad_config_fails_startup() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.json"), "not json").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cli"))
        .current_dir(dir.path())
        .env("LSMKV_CONFIG", dir.path().join("config.json"))
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load configuration"));
}

#[test]
fn test_empty_key_rejection() {
    let dir = tempdir().unwrap();
    // A lone PUT has no key at all.
    let output = run_cli(dir.path(), &[], "PUT\n");
    assert!(output.contains("ERR usage: PUT key value"));
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), &[], "PUT a 1\nSTATS\n");
    assert!(output.contains("memtable_size: 1"));
}
