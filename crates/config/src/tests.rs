use super::*;

#[test]
fn defaults_match_spec() {
    let cfg = Config::default();
    assert_eq!(cfg.max_segment_size, 2 * 1024 * 1024);
    assert_eq!(cfg.max_block_size, 100 * 1024);
    assert_eq!(cfg.num_levels, 6);
    assert_eq!(cfg.memtable_partitions, 6);
    assert_eq!(cfg.sleep_between_compactions_ms, 1);
    assert!(cfg.enable_throttling);
    assert!(!cfg.wal_fsync);
}

#[test]
fn level_threshold_grows_exponentially() {
    let t = LevelThreshold::default();
    assert_eq!(t.threshold(0), 4);
    assert_eq!(t.threshold(1), 5);
    assert_eq!(t.threshold(2), 25);
    assert_eq!(t.threshold(3), 125);
}

#[test]
fn compression_code_roundtrip() {
    for c in [
        CompressionType::None,
        CompressionType::Snappy,
        CompressionType::Lz4,
    ] {
        assert_eq!(CompressionType::from_code(c.code()), Some(c));
    }
    assert_eq!(CompressionType::from_code(0xFF), None);
}
