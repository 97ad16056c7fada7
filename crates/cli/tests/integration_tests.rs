//! Integration tests that drive the `cli` binary as a subprocess over its
//! stdin/stdout REPL protocol.
use std::path::Path;
use tempfile::tempdir;

fn run_cli_command(data_dir: &Path, commands: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("KV_DATA_DIR", data_dir.to_str().unwrap())
        .env("KV_L0_TRIGGER", "2")
        .env("KV_NUM_LEVELS", "3")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cli");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(commands.as_bytes()).expect("failed to write commands");
        stdin.write_all(b"EXIT\n").expect("failed to write EXIT");
    }

    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_basic_set_get() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "SET key1 value1\nGET key1\n");

    assert!(output.contains("OK"));
    assert!(output.contains("value1"));
}

#[test]
fn test_multiple_keys() {
    let dir = tempdir().unwrap();
    let commands = "SET a 1\nSET b 2\nSET c 3\nGET a\nGET b\nGET c\n";
    let output = run_cli_command(dir.path(), commands);

    assert!(output.contains("1"));
    assert!(output.contains("2"));
    assert!(output.contains("3"));
}

#[test]
fn test_overwrite_key() {
    let dir = tempdir().unwrap();
    let commands = "SET mykey oldvalue\nGET mykey\nSET mykey newvalue\nGET mykey\n";
    let output = run_cli_command(dir.path(), commands);

    assert!(output.contains("oldvalue"));
    assert!(output.contains("newvalue"));
}

#[test]
fn test_get_missing_key() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "GET nope\n");

    assert!(output.contains("(nil)"));
}

#[test]
fn test_flush_to_segment() {
    let dir = tempdir().unwrap();
    let commands = "SET a 1\nSET b 2\nFLUSH\nGET a\nGET b\n";
    let output = run_cli_command(dir.path(), commands);

    assert!(output.contains("OK"));
    assert!(output.contains("1"));
    assert!(output.contains("2"));

    let level0 = dir.path().join("level0");
    let seg_files: Vec<_> = std::fs::read_dir(&level0)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("seg"))
        .collect();
    assert!(!seg_files.is_empty(), "a segment should exist after flush");
}

#[test]
fn test_manual_compaction() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for batch in 0..3 {
        for i in 0..5 {
            commands.push_str(&format!("SET batch{batch}_key{i} val{}\n", batch * 10 + i));
        }
        commands.push_str("FLUSH\n");
    }
    commands.push_str("COMPACT 0\n");
    for batch in 0..3 {
        for i in 0..5 {
            commands.push_str(&format!("GET batch{batch}_key{i}\n"));
        }
    }

    let output = run_cli_command(dir.path(), &commands);

    assert!(output.contains("val0"));
    assert!(output.contains("val10"));
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let commands = "SET x 1\nSET y 2\nFLUSH\nSTATS\n";
    let output = run_cli_command(dir.path(), commands);

    assert!(output.contains("memtable"));
    assert!(output.contains("L0"));
}

#[test]
fn test_quit_command() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "SET foo bar\nQUIT\n");

    assert!(output.contains("OK"));
    assert!(output.contains("bye"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    run_cli_command(dir.path(), "SET persist_key persist_value\nFLUSH\n");
    let output = run_cli_command(dir.path(), "GET persist_key\n");

    assert!(output.contains("persist_value"));
}

#[test]
fn test_large_value() {
    let dir = tempdir().unwrap();
    let large_value = "x".repeat(500);
    let commands = format!("SET large_key {large_value}\nGET large_key\n");
    let output = run_cli_command(dir.path(), &commands);

    assert!(output.contains(&large_value));
}

#[test]
fn test_set_usage_error() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "SET onlykey\n");

    assert!(output.contains("ERR usage"));
}
