//! # CLI - interactive shell over the storage engine
//!
//! A REPL-style command-line interface over [`engine::Engine`]. Reads
//! commands from stdin, executes them against the engine, and prints
//! results to stdout. Works both interactively and scripted (pipe commands
//! via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value   Insert or update a key-value pair
//! GET key         Look up a key (prints value or "(nil)")
//! FLUSH           Force flush the memtable to L0
//! COMPACT [level] Run one synchronous compaction round (default level 0)
//! STATS           Print memtable/level statistics
//! EXIT / QUIT     Shut down gracefully
//! ```
//!
//! There is no `DEL` or `SCAN`: deletion and range scans are out of scope
//! for the engine itself.
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! KV_DATA_DIR           Engine data directory      (default: "data")
//! KV_NUM_LEVELS         Number of levels           (default: 6)
//! KV_L0_TRIGGER         L0 compaction trigger      (default: 4)
//! KV_MEMTABLE_SHARDS    Memtable shard count       (default: 6)
//! KV_WAL_FSYNC          fsync every WAL append     (default: "false")
//! KV_ENABLE_THROTTLING  Throttle writes under load (default: "true")
//! ```
use anyhow::{Context, Result};
use config::Config;
use engine::Engine;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn config_from_env() -> Config {
    let mut config = Config::default();
    config.num_levels = env_or("KV_NUM_LEVELS", &config.num_levels.to_string())
        .parse()
        .unwrap_or(config.num_levels);
    config.level_compaction_threshold.l0_trigger =
        env_or("KV_L0_TRIGGER", &config.level_compaction_threshold.l0_trigger.to_string())
            .parse()
            .unwrap_or(config.level_compaction_threshold.l0_trigger);
    config.memtable_partitions = env_or("KV_MEMTABLE_SHARDS", &config.memtable_partitions.to_string())
        .parse()
        .unwrap_or(config.memtable_partitions);
    config.wal_fsync = env_or("KV_WAL_FSYNC", &config.wal_fsync.to_string())
        .parse()
        .unwrap_or(config.wal_fsync);
    config.enable_throttling = env_or("KV_ENABLE_THROTTLING", &config.enable_throttling.to_string())
        .parse()
        .unwrap_or(config.enable_throttling);
    config
}

fn main() -> Result<()> {
    let data_dir = env_or("KV_DATA_DIR", "data");
    let config = config_from_env();

    let engine = Engine::open(&data_dir, config).context("failed to open engine")?;

    println!("storage engine started (dir={data_dir})");
    println!("commands: SET key value | GET key | FLUSH | COMPACT [level] | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.set(k, &v) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {e}"),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k) {
                            Ok(Some(v)) => println!("{v}"),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "FLUSH" => match engine.force_flush() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR flush failed: {e}"),
                },
                "COMPACT" => {
                    let level: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    match engine.run_compaction(level) {
                        Ok(ran) => println!("OK (ran={ran})"),
                        Err(e) => println!("ERR compact failed: {e}"),
                    }
                }
                "STATS" => print!("{}", engine.stats()),
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {other}"),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.stop();
    Ok(())
}
