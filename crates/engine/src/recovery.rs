//! Cold-start recovery.
//!
//! Loads the manifest's live segments into [`Levels`], replays whatever WAL
//! generations are left over from an unclean shutdown into a fresh
//! memtable, flushes that memtable to L0 if it came back non-empty, and
//! deletes the replayed generations. The next WAL generation is
//! `lastReplayedGeneration + 1`, or `1` if the WAL directory was empty.
//! Malformed trailing WAL records are tolerated by [`wal::replay`] itself;
//! this module only has to decide what to do with whatever came back. A
//! manifest-listed segment that fails to open with a corruption error is
//! dropped and its file unlinked rather than failing recovery outright —
//! its data either never became live or a newer copy exists via the
//! manifest.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use config::Config;
use levels::Levels;
use manifest::Manifest;
use memtable::Memtable;
use segment::{Segment, SegmentError};
use wal::WalWriter;
use std::sync::Arc;

use crate::write::flush_memtable_to_l0;
use crate::{parse_manifest_path, EngineError};

pub(crate) struct Recovered {
    pub memtable: Memtable,
    pub wal_writer: WalWriter,
    pub levels: Levels,
    pub manifest: Manifest,
    pub next_segment_num: u64,
}

pub(crate) fn recover(dir: &Path, wal_dir: &Path, config: &Config) -> Result<Recovered, EngineError> {
    let manifest = Manifest::load_or_create(dir)?;
    let levels = Levels::new(config.num_levels);

    let mut max_num: Option<u64> = None;
    for path in manifest.live_segments() {
        let (level, num) = parse_manifest_path(path)
            .ok_or_else(|| EngineError::Corruption(format!("unparseable manifest entry: {path}")))?;
        match Segment::open(&dir.join(path), num) {
            Ok(segment) => {
                levels.add_segment(level, Arc::new(segment));
                max_num = Some(max_num.map_or(num, |m| m.max(num)));
            }
            Err(SegmentError::Corruption(_) | SegmentError::CorruptRecord) => {
                log::warn!("dropping corrupt segment {path} during recovery");
                let _ = std::fs::remove_file(dir.join(path));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let generations = wal::list_generations(wal_dir)?;
    let mut replayed = Memtable::new(config.memtable_partitions);
    if !generations.is_empty() {
        wal::replay(wal_dir, |key, value| replayed.put(key, value))?;
    }
    let next_generation = generations.last().map(|g| g + 1).unwrap_or(1);

    let next_segment_num = AtomicU64::new(max_num.map_or(1, |m| m + 1));
    let manifest_lock = Mutex::new(manifest);

    if !replayed.is_empty() {
        flush_memtable_to_l0(dir, config, &next_segment_num, &manifest_lock, &levels, &replayed)?;
    }

    for generation in generations {
        wal::remove_generation(wal_dir, generation)?;
    }

    let wal_writer = WalWriter::open(wal_dir, next_generation, config.wal_fsync)?;

    Ok(Recovered {
        memtable: Memtable::new(config.memtable_partitions),
        wal_writer,
        levels,
        manifest: manifest_lock.into_inner().expect("manifest mutex poisoned"),
        next_segment_num: next_segment_num.load(Ordering::SeqCst),
    })
}
