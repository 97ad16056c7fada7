use crate::*;
use config::Config;
use tempfile::tempdir;

fn small_wal_config() -> Config {
    Config {
        max_wal_size: 64,
        num_levels: 3,
        enable_throttling: false,
        ..Config::default()
    }
}

#[test]
fn set_and_get() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();

    engine.set("name", "alice").unwrap();
    assert_eq!(engine.get("name").unwrap().unwrap(), "alice");
}

#[test]
fn get_missing_key() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();
    assert!(engine.get("nope").unwrap().is_none());
}

#[test]
fn overwrite_key_returns_latest() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();

    engine.set("k", "v1").unwrap();
    engine.set("k", "v2").unwrap();
    assert_eq!(engine.get("k").unwrap().unwrap(), "v2");
}

#[test]
fn force_flush_on_empty_memtable_is_noop() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();
    let stats_before = engine.stats();
    engine.force_flush().unwrap();
    assert_eq!(engine.stats().levels, stats_before.levels);
}

#[test]
fn force_flush_persists_memtable_to_l0() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();

    engine.set("key", "value").unwrap();
    engine.force_flush().unwrap();

    let stats = engine.stats();
    assert_eq!(stats.memtable_entries, 0);
    assert_eq!(stats.levels[0].segment_count, 1);
}

#[test]
fn flush_triggers_automatically_past_wal_size() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), small_wal_config()).unwrap();

    for i in 0..50 {
        engine.set(&format!("key{i:04}"), "0123456789").unwrap();
    }

    assert!(engine.stats().levels[0].segment_count > 0);
    for i in 0..50 {
        assert_eq!(engine.get(&format!("key{i:04}")).unwrap().unwrap(), "0123456789");
    }
}

#[test]
fn drop_flushes_remaining_memtable() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), Config::default()).unwrap();
        engine.set("drop_key", "drop_val").unwrap();
    }

    let engine = Engine::open(dir.path(), Config::default()).unwrap();
    assert_eq!(engine.get("drop_key").unwrap().unwrap(), "drop_val");
}

#[test]
fn set_rejects_oversized_key() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();

    let big_key = "k".repeat(segment::entry::MAX_FIELD_LEN + 1);
    let result = engine.set(&big_key, "v");
    assert!(matches!(result, Err(EngineError::KeyTooLarge(_))));
}

#[test]
fn set_rejects_oversized_value() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();

    let big_value = "v".repeat(segment::entry::MAX_FIELD_LEN + 1);
    let result = engine.set("k", &big_value);
    assert!(matches!(result, Err(EngineError::ValueTooLarge(_))));
}

#[test]
fn set_after_stop_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).unwrap();
    engine.stop();
    assert!(matches!(engine.set("k", "v"), Err(EngineError::ShuttingDown)));
}
