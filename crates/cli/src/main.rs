//! # CLI - interactive shell
//!
//! A REPL over the storage engine. Reads commands from stdin, executes them,
//! and prints results to stdout. Works interactively or with commands piped
//! through stdin.
//!
//! ## Commands
//!
//! ```text
//! PUT key value...   Insert or update a key (the value may contain spaces)
//! GET key            Look up a key in the write buffer (prints value or "(nil)")
//! DELETE key         Delete a key (writes a tombstone); DEL also works
//! FLUSH              Write the buffer to a new sorted run
//! VERIFY [gen]       Check the integrity root of one run, or of all runs
//! INDEX [gen]        Print a run's index (latest run by default)
//! SUMMARY [gen]      Print a run's summary (latest run by default)
//! STATS              Print engine state
//! EXIT / QUIT        Shut down
//! ```
//!
//! ## Configuration
//!
//! Settings are read from the JSON file named by `LSMKV_CONFIG` (default
//! `config.json`; a missing file means defaults) and then overridden by
//! `LSMKV_*` environment variables, see the `config` crate.
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `warn`).
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! lsmkv started (wal=wal.log, data_dir=data, capacity=1000, runs=0)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > FLUSH
//! OK (run 1, 1 records)
//! > VERIFY
//! run 1: OK
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::Config;
use engine::Engine;
use sstable::{read_index_file, RunPaths};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let config_path = env_or("LSMKV_CONFIG", "config.json");
    let config = Config::load(&config_path)
        .and_then(Config::with_env_overrides)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let mut engine = Engine::open(config)?;
    info!(config_path = %config_path, runs = engine.runs().len(), "engine opened");

    println!(
        "lsmkv started (wal={}, data_dir={}, capacity={}, runs={})",
        engine.config().wal_path.display(),
        engine.config().data_dir.display(),
        engine.config().memtable_max_size,
        engine.runs().len()
    );
    println!("Commands: PUT key value | GET key | DELETE key | FLUSH");
    println!("          VERIFY [gen] | INDEX [gen] | SUMMARY [gen] | STATS | EXIT");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    write!(out, "> ")?;
    out.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if !execute(&mut engine, &line, &mut out)? {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    engine.close()
}

/// Runs one command line. Returns `Ok(false)` when the shell should exit.
fn execute<W: Write>(engine: &mut Engine, line: &str, out: &mut W) -> io::Result<bool> {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next() {
        Some(cmd) => cmd,
        None => return Ok(true),
    };

    match cmd.to_uppercase().as_str() {
        "PUT" => match parts.next() {
            Some(k) => {
                let v = parts.collect::<Vec<&str>>().join(" ");
                if v.is_empty() {
                    writeln!(out, "ERR usage: PUT key value")?;
                } else {
                    match engine.put(k.as_bytes().to_vec(), v.into_bytes()) {
                        Ok(()) => writeln!(out, "OK")?,
                        Err(e) => writeln!(out, "ERR put failed: {:#}", e)?,
                    }
                }
            }
            None => writeln!(out, "ERR usage: PUT key value")?,
        },
        "GET" => match parts.next() {
            Some(k) => match engine.get(k.as_bytes()) {
                Some(v) => writeln!(out, "{}", String::from_utf8_lossy(&v))?,
                None => writeln!(out, "(nil)")?,
            },
            None => writeln!(out, "ERR usage: GET key")?,
        },
        "DELETE" | "DEL" => match parts.next() {
            Some(k) => match engine.delete(k.as_bytes().to_vec()) {
                Ok(()) => writeln!(out, "OK")?,
                Err(e) => writeln!(out, "ERR delete failed: {:#}", e)?,
            },
            None => writeln!(out, "ERR usage: DELETE key")?,
        },
        "FLUSH" => match engine.flush() {
            Ok(Some(info)) => writeln!(
                out,
                "OK (run {}, {} records)",
                engine.runs().last().copied().unwrap_or_default(),
                info.records
            )?,
            Ok(None) => writeln!(out, "OK (buffer empty)")?,
            Err(e) => writeln!(out, "ERR flush failed: {:#}", e)?,
        },
        "VERIFY" => match parse_generation(parts.next()) {
            Ok(Some(generation)) => report_verify(out, generation, engine.verify(generation))?,
            Ok(None) => {
                let results = engine.verify_all();
                if results.is_empty() {
                    writeln!(out, "(no runs)")?;
                }
                for (generation, result) in results {
                    report_verify(out, generation, result)?;
                }
            }
            Err(msg) => writeln!(out, "ERR {}", msg)?,
        },
        "INDEX" => print_entries(engine, parts.next(), out, |p| p.index)?,
        "SUMMARY" => print_entries(engine, parts.next(), out, |p| p.summary)?,
        "STATS" => writeln!(out, "{:?}", engine)?,
        "EXIT" | "QUIT" => {
            writeln!(out, "bye")?;
            return Ok(false);
        }
        other => writeln!(out, "unknown command: {}", other)?,
    }
    Ok(true)
}

fn parse_generation(arg: Option<&str>) -> Result<Option<u64>, String> {
    match arg {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid run generation: {}", s)),
    }
}

fn report_verify<W: Write>(
    out: &mut W,
    generation: u64,
    result: Result<(), sstable::SSTableError>,
) -> io::Result<()> {
    match result {
        Ok(()) => writeln!(out, "run {}: OK", generation),
        Err(e) => writeln!(out, "run {}: FAILED ({})", generation, e),
    }
}

/// Prints the `.index` or `.summary` entries of a run. Without an argument
/// the most recent run is used.
fn print_entries<W, F>(engine: &Engine, arg: Option<&str>, out: &mut W, pick: F) -> io::Result<()>
where
    W: Write,
    F: Fn(RunPaths) -> std::path::PathBuf,
{
    let generation = match parse_generation(arg) {
        Ok(Some(generation)) => generation,
        Ok(None) => match engine.runs().last() {
            Some(&generation) => generation,
            None => return writeln!(out, "(no runs)"),
        },
        Err(msg) => return writeln!(out, "ERR {}", msg),
    };

    let path = pick(RunPaths::new(engine.run_path(generation)));
    match read_index_file(&path) {
        Ok(entries) => {
            for entry in &entries {
                writeln!(
                    out,
                    "{} -> {}",
                    String::from_utf8_lossy(&entry.key),
                    entry.offset
                )?;
            }
            writeln!(out, "({} entries)", entries.len())
        }
        Err(e) => writeln!(out, "ERR cannot read {}: {}", path.display(), e),
    }
}
