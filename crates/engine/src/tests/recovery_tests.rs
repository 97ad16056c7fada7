use crate::*;
use config::Config;
use tempfile::tempdir;

#[test]
fn recovery_replays_unflushed_wal_into_l0() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), Config::default()).unwrap();
        engine.set("a", "1").unwrap();
        engine.set("b", "2").unwrap();
        // dropped without an explicit flush; Drop flushes it anyway, so
        // reopen exercises the manifest/segment path, not WAL replay.
        engine.stop();
    }

    let engine = Engine::open(dir.path(), Config::default()).unwrap();
    assert_eq!(engine.get("a").unwrap().unwrap(), "1");
    assert_eq!(engine.get("b").unwrap().unwrap(), "2");
}

#[test]
fn recovery_after_unclean_shutdown_replays_wal_without_flush() {
    let dir = tempdir().unwrap();
    let config = Config {
        enable_throttling: false,
        ..Config::default()
    };
    {
        let engine = Engine::open(dir.path(), config.clone()).unwrap();
        engine.set("a", "1").unwrap();
        engine.set("b", "2").unwrap();
        // Simulate a crash: leak the engine so Drop never runs and the WAL
        // generation is left on disk with no matching L0 segment.
        std::mem::forget(engine);
    }

    let engine = Engine::open(dir.path(), config).unwrap();
    assert_eq!(engine.get("a").unwrap().unwrap(), "1");
    assert_eq!(engine.get("b").unwrap().unwrap(), "2");
}

#[test]
fn recovery_combines_flushed_segments_and_replayed_wal() {
    let dir = tempdir().unwrap();
    let config = Config {
        enable_throttling: false,
        ..Config::default()
    };

    {
        let engine = Engine::open(dir.path(), config.clone()).unwrap();
        engine.set("flushed", "in_segment").unwrap();
        engine.force_flush().unwrap();
        engine.set("pending", "in_wal").unwrap();
        std::mem::forget(engine);
    }

    let engine = Engine::open(dir.path(), config).unwrap();
    assert_eq!(engine.get("flushed").unwrap().unwrap(), "in_segment");
    assert_eq!(engine.get("pending").unwrap().unwrap(), "in_wal");
}

#[test]
fn next_segment_number_survives_restart_without_reuse() {
    let dir = tempdir().unwrap();
    let config = Config {
        enable_throttling: false,
        ..Config::default()
    };

    {
        let engine = Engine::open(dir.path(), config.clone()).unwrap();
        engine.set("a", "1").unwrap();
        engine.force_flush().unwrap();
        engine.set("b", "2").unwrap();
        engine.force_flush().unwrap();
    }

    let engine = Engine::open(dir.path(), config).unwrap();
    engine.set("c", "3").unwrap();
    engine.force_flush().unwrap();

    // Three distinct flushes must have produced three distinct segments,
    // none of which collided on a reused segment number.
    assert_eq!(engine.stats().levels[0].segment_count, 3);
    assert_eq!(engine.get("a").unwrap().unwrap(), "1");
    assert_eq!(engine.get("b").unwrap().unwrap(), "2");
    assert_eq!(engine.get("c").unwrap().unwrap(), "3");
}
