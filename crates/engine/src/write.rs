//! Write path: `set`, the memtable→L0 flush, and the shared flush primitive
//! recovery also uses to drain a replayed memtable.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use config::Config;
use levels::Levels;
use manifest::Manifest;
use memtable::{Memtable, Shard};
use segment::entry::MAX_FIELD_LEN;
use segment::writer::{SegmentMeta, SegmentWriter};
use segment::Segment;

use crate::{level_dir, manifest_path, Engine, EngineError, WriteState};

/// Writes one shard's entries into fresh L0 segments, rolling over to a new
/// output file once `max_segment_size` is reached. Mirrors
/// `compaction::compact_into`'s rollover logic but walks a single sorted
/// map instead of a merge of several segments.
fn write_shard_to_l0(
    target_dir: &Path,
    config: &Config,
    next_segment_num: &AtomicU64,
    shard: &Shard,
) -> Result<Vec<SegmentMeta>, EngineError> {
    fs::create_dir_all(target_dir)?;

    let mut metas = Vec::new();
    let mut writer = SegmentWriter::create(
        target_dir,
        next_segment_num.fetch_add(1, Ordering::SeqCst),
        config.compression_type,
        config.max_block_size,
    )?;
    let mut bytes_in_current = 0u64;

    for (key, value) in shard.iter() {
        let entry_len = 5 + key.len() as u64 + value.len() as u64;
        if bytes_in_current > 0 && bytes_in_current + entry_len > config.max_segment_size {
            if let Some(meta) = writer.done()? {
                metas.push(meta);
            }
            writer = SegmentWriter::create(
                target_dir,
                next_segment_num.fetch_add(1, Ordering::SeqCst),
                config.compression_type,
                config.max_block_size,
            )?;
            bytes_in_current = 0;
        }
        writer.add(key, value)?;
        bytes_in_current += entry_len;
    }
    if let Some(meta) = writer.done()? {
        metas.push(meta);
    }
    Ok(metas)
}

/// Flushes every non-empty shard of `memtable` into new L0 segments,
/// records them in the manifest, and publishes them into `levels`. Shared
/// between the live flush path and cold-start recovery's one-time flush of
/// a replayed memtable.
pub(crate) fn flush_memtable_to_l0(
    dir: &Path,
    config: &Config,
    next_segment_num: &AtomicU64,
    manifest: &Mutex<Manifest>,
    levels: &Levels,
    memtable: &Memtable,
) -> Result<(), EngineError> {
    let target_dir = level_dir(dir, 0);

    let mut metas = Vec::new();
    for idx in 0..memtable.shard_count() {
        let shard = memtable.shard(idx);
        if shard.is_empty() {
            continue;
        }
        metas.extend(write_shard_to_l0(&target_dir, config, next_segment_num, shard)?);
    }
    if metas.is_empty() {
        return Ok(());
    }

    {
        let mut guard = manifest.lock().expect("manifest lock poisoned");
        for meta in &metas {
            guard.add(manifest_path(0, meta.num))?;
        }
    }

    for meta in metas {
        let segment = Segment::open(&meta.path, meta.num)?;
        levels.add_segment(0, Arc::new(segment));
    }

    Ok(())
}

impl Engine {
    /// Writes `key` → `value`: appended to the WAL, then applied to the
    /// active memtable. Triggers a flush to L0 if the WAL has grown past
    /// `config.max_wal_size`.
    pub fn set(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        if key.len() > MAX_FIELD_LEN {
            return Err(EngineError::KeyTooLarge(key.len()));
        }
        if value.len() > MAX_FIELD_LEN {
            return Err(EngineError::ValueTooLarge(value.len()));
        }

        self.throttle_if_behind();

        let needs_flush = {
            let mut state = self.state.lock().expect("write state lock poisoned");
            let wal = state
                .wal
                .as_mut()
                .expect("wal writer present while engine is running");
            wal.append(key, value)?;
            state.memtable.put(key, value);
            wal.bytes_written() >= self.config.max_wal_size
        };

        if needs_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the active memtable to L0 even if it hasn't crossed
    /// `max_wal_size` yet. A no-op if the memtable is empty.
    pub fn force_flush(&self) -> Result<(), EngineError> {
        self.flush()
    }

    /// Rolls the WAL to a new generation and swaps in a fresh memtable while
    /// holding `state`'s lock just long enough to do the pointer swap, then
    /// flushes the captured old memtable to L0 and removes the superseded
    /// WAL generation with the lock released — so a concurrent `get()` only
    /// ever blocks for the swap, not for segment disk I/O. The new
    /// WAL/memtable pair is installed before the old generation is removed,
    /// so a crash mid-flush always leaves something replayable. A no-op if
    /// the memtable is already empty.
    fn flush(&self) -> Result<(), EngineError> {
        let swapped = {
            let mut state = self.state.lock().expect("write state lock poisoned");
            self.swap_for_flush(&mut state)?
        };

        let Some((old_memtable, old_generation)) = swapped else {
            return Ok(());
        };

        flush_memtable_to_l0(
            &self.dir,
            &self.config,
            &self.next_segment_num,
            &self.manifest,
            &self.levels,
            &old_memtable,
        )?;

        wal::remove_generation(&self.wal_dir, old_generation)?;
        Ok(())
    }

    /// Performs the in-memory half of a flush under `state`'s lock: rolls
    /// the WAL to a new generation and replaces the memtable with an empty
    /// one, handing back whatever was swapped out for the caller to persist
    /// once the lock is released. Returns `None` without touching anything
    /// if the memtable is empty.
    fn swap_for_flush(&self, state: &mut WriteState) -> Result<Option<(Memtable, u64)>, EngineError> {
        if state.memtable.is_empty() {
            return Ok(None);
        }

        let old_wal = state
            .wal
            .take()
            .expect("wal writer present while engine is running");
        let old_generation = old_wal.generation();
        state.wal = Some(old_wal.start_next()?);

        let old_memtable = std::mem::replace(&mut state.memtable, Memtable::new(self.config.memtable_partitions));
        Ok(Some((old_memtable, old_generation)))
    }
}
