//! # Compaction — background merge scheduling
//!
//! Generalizes "merge everything into one output segment" into a
//! per-level scheduler running on two background threads:
//!
//! - the **L0 worker** waits for L0 to accumulate `l0_trigger` segments
//!   not already being compacted, folds the oldest eligible ones (capped
//!   at `l0_overlap_cap`, since L0 segments can overlap arbitrarily) plus
//!   whatever L1 segments their combined key span touches, and writes
//!   the result into L1;
//! - the **L>=1 worker** scores every level `1..numLevels-1` as
//!   `bytes_live / (threshold(level) * max_segment_size)`, picks
//!   whichever is furthest over 1.0, and folds one of that level's
//!   segments (chosen round-robin by key, so repeated rounds sweep the
//!   whole level instead of hammering the same key range) plus whatever
//!   it overlaps in the level below into that level.
//!
//! Both paths share one merge-and-write primitive: [`segment::merge::MergeIterator`]
//! feeding [`segment::writer::SegmentWriter`], rolling the writer over to a
//! fresh output segment once `max_segment_size` is reached so one compaction
//! round never produces an unbounded file. New segment numbers are drawn
//! from a single counter shared with the write path, so `segment_num`
//! comparisons stay meaningful for recency even across level directories.
//!
//! A compacted-away segment's backing file is unlinked the moment the new
//! `Levels`/`Manifest` state is published. See `levels`'s module doc for
//! why that is safe even while another thread still holds an `Arc<Segment>`
//! with the file open.

mod error;

pub use error::CompactionError;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use config::Config;
use levels::Levels;
use manifest::Manifest;
use segment::merge::MergeIterator;
use segment::writer::SegmentWriter;
use segment::Segment;

fn level_dir(root: &Path, level: usize) -> PathBuf {
    root.join(format!("level{level}"))
}

/// The ledger-line path for a segment, e.g. `level1/seg00000000000000000010`.
fn manifest_path(level: usize, num: u64) -> String {
    format!("level{level}/seg{num:020}")
}

fn span_of(segments: &[Arc<Segment>]) -> Option<(String, String)> {
    let mut iter = segments.iter();
    let first = iter.next()?;
    let mut min = first.min_key.clone();
    let mut max = first.max_key.clone();
    for s in iter {
        if s.min_key < min {
            min = s.min_key.clone();
        }
        if s.max_key > max {
            max = s.max_key.clone();
        }
    }
    Some((min, max))
}

/// Streams every entry across `inputs` through a newest-wins merge and
/// writes the result into fresh segments under `target_dir`, rolling over
/// once `max_segment_size` is reached. Returns the opened output segments
/// in ascending key order.
fn compact_into(
    target_dir: &Path,
    inputs: &[Arc<Segment>],
    compression: config::CompressionType,
    max_block_size: u64,
    max_segment_size: u64,
    next_num: &AtomicU64,
) -> Result<Vec<Arc<Segment>>, CompactionError> {
    fs::create_dir_all(target_dir)?;

    let mut streams = Vec::with_capacity(inputs.len());
    for seg in inputs {
        streams.push((seg.num, seg.iter_entries()?));
    }
    let merged = MergeIterator::new(streams);

    let mut outputs = Vec::new();
    let mut writer = SegmentWriter::create(
        target_dir,
        next_num.fetch_add(1, Ordering::SeqCst),
        compression,
        max_block_size,
    )?;
    let mut bytes_in_current = 0u64;

    for entry in merged {
        let entry_len = entry.encoded_len() as u64;
        if bytes_in_current > 0 && bytes_in_current + entry_len > max_segment_size {
            if let Some(meta) = writer.done()? {
                outputs.push(Arc::new(Segment::open(&meta.path, meta.num)?));
            }
            writer = SegmentWriter::create(
                target_dir,
                next_num.fetch_add(1, Ordering::SeqCst),
                compression,
                max_block_size,
            )?;
            bytes_in_current = 0;
        }
        writer.add(&entry.key, &entry.value)?;
        bytes_in_current += entry_len;
    }
    if let Some(meta) = writer.done()? {
        outputs.push(Arc::new(Segment::open(&meta.path, meta.num)?));
    }

    Ok(outputs)
}

/// State shared between the two worker threads and the public handle.
struct Shared {
    root: PathBuf,
    config: Config,
    levels: Arc<Levels>,
    manifest: Arc<Mutex<Manifest>>,
    next_segment_num: Arc<AtomicU64>,
    stop: AtomicBool,
    ln_cursor: Mutex<HashMap<usize, String>>,
}

/// Runs one L0→L1 compaction round if L0 has enough eligible segments.
/// Returns `true` if a round actually ran.
fn run_l0_round(shared: &Shared) -> Result<bool, CompactionError> {
    let snapshot = shared.levels.snapshot(0);
    let segments: Vec<Arc<Segment>> = snapshot.segments_iter().cloned().collect(); // newest first
    let eligible: Vec<Arc<Segment>> = segments
        .into_iter()
        .filter(|s| !shared.levels.is_marked_for_compaction(0, s.num))
        .collect();

    let trigger = shared.config.level_compaction_threshold.l0_trigger as usize;
    if eligible.len() < trigger {
        return Ok(false);
    }

    // `eligible` is newest-first; fold the oldest ones first, capped so one
    // round never has to merge an unbounded number of overlapping inputs.
    let mut batch: Vec<Arc<Segment>> = eligible
        .into_iter()
        .rev()
        .take(shared.config.l0_overlap_cap)
        .collect();
    batch.reverse();

    let nums: Vec<u64> = batch.iter().map(|s| s.num).collect();
    shared.levels.mark_for_compaction(0, &nums);

    let result = (|| -> Result<bool, CompactionError> {
        let Some((lo, hi)) = span_of(&batch) else {
            return Ok(false);
        };
        let l1_snapshot = shared.levels.snapshot(1);
        let overlapping = l1_snapshot.overlapping_segments(&lo, &hi);

        let mut inputs = batch.clone();
        inputs.extend(overlapping.iter().cloned());

        let target_dir = level_dir(&shared.root, 1);
        let new_segments = compact_into(
            &target_dir,
            &inputs,
            shared.config.compression_type,
            shared.config.max_block_size,
            shared.config.max_segment_size,
            &shared.next_segment_num,
        )?;

        let mut old_paths: Vec<String> = nums.iter().map(|n| manifest_path(0, *n)).collect();
        old_paths.extend(overlapping.iter().map(|s| manifest_path(1, s.num)));
        let new_paths: Vec<String> = new_segments.iter().map(|s| manifest_path(1, s.num)).collect();
        shared
            .manifest
            .lock()
            .expect("manifest lock poisoned")
            .replace(&old_paths, &new_paths)?;

        shared.levels.replace_segments(0, &nums, Vec::new());
        let overlap_nums: Vec<u64> = overlapping.iter().map(|s| s.num).collect();
        shared.levels.replace_segments(1, &overlap_nums, new_segments);

        for s in batch.iter().chain(overlapping.iter()) {
            let _ = fs::remove_file(&s.path);
        }
        Ok(true)
    })();

    shared.levels.unmark_for_compaction(0, &nums);
    result
}

/// Runs one compaction round on whichever level `1..numLevels-1` is
/// furthest over its byte budget. Returns `true` if a round actually ran.
fn run_ln_round(shared: &Shared) -> Result<bool, CompactionError> {
    let num_levels = shared.levels.num_levels();
    if num_levels < 3 {
        return Ok(false);
    }

    let mut best: Option<(usize, f64)> = None;
    for level in 1..num_levels - 1 {
        let snapshot = shared.levels.snapshot(level);
        let threshold = shared.config.level_compaction_threshold.threshold(level);
        let budget = (threshold * shared.config.max_segment_size).max(1);
        let score = snapshot.total_bytes() as f64 / budget as f64;
        if score > 1.0 && best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((level, score));
        }
    }
    let Some((level, _)) = best else {
        return Ok(false);
    };

    let snapshot = shared.levels.snapshot(level);
    let eligible: Vec<Arc<Segment>> = snapshot
        .segments_iter()
        .filter(|s| !shared.levels.is_marked_for_compaction(level, s.num))
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Ok(false);
    }

    let chosen = {
        let mut cursors = shared.ln_cursor.lock().expect("cursor lock poisoned");
        let last_key = cursors.get(&level).cloned();
        let pick = match &last_key {
            Some(k) => eligible
                .iter()
                .find(|s| s.min_key.as_str() > k.as_str())
                .or_else(|| eligible.first())
                .expect("eligible is non-empty")
                .clone(),
            None => eligible[0].clone(),
        };
        cursors.insert(level, pick.max_key.clone());
        pick
    };

    shared.levels.mark_for_compaction(level, &[chosen.num]);

    let result = (|| -> Result<bool, CompactionError> {
        let next_level = level + 1;
        let next_snapshot = shared.levels.snapshot(next_level);
        let mut overlapping = next_snapshot.overlapping_segments(&chosen.min_key, &chosen.max_key);

        // Bound how many grandchild segments one output's key span may come
        // to overlap: if folding in every overlapping child would already
        // touch more than the cap in the level below that, skip the fold
        // this round and just rewrite the chosen segment alone.
        if next_level + 1 < num_levels {
            let grandchild_snapshot = shared.levels.snapshot(next_level + 1);
            let grandchild_overlap = grandchild_snapshot
                .overlapping_segments(&chosen.min_key, &chosen.max_key)
                .len();
            if grandchild_overlap > shared.config.grandchild_overlap_cap {
                overlapping.clear();
            }
        }

        let mut inputs = vec![chosen.clone()];
        inputs.extend(overlapping.iter().cloned());

        let target_dir = level_dir(&shared.root, next_level);
        let new_segments = compact_into(
            &target_dir,
            &inputs,
            shared.config.compression_type,
            shared.config.max_block_size,
            shared.config.max_segment_size,
            &shared.next_segment_num,
        )?;

        let mut old_paths = vec![manifest_path(level, chosen.num)];
        old_paths.extend(overlapping.iter().map(|s| manifest_path(next_level, s.num)));
        let new_paths: Vec<String> = new_segments
            .iter()
            .map(|s| manifest_path(next_level, s.num))
            .collect();
        shared
            .manifest
            .lock()
            .expect("manifest lock poisoned")
            .replace(&old_paths, &new_paths)?;

        shared.levels.replace_segments(level, &[chosen.num], Vec::new());
        let overlap_nums: Vec<u64> = overlapping.iter().map(|s| s.num).collect();
        shared.levels.replace_segments(next_level, &overlap_nums, new_segments);

        let _ = fs::remove_file(&chosen.path);
        for s in &overlapping {
            let _ = fs::remove_file(&s.path);
        }
        Ok(true)
    })();

    shared.levels.unmark_for_compaction(level, &[chosen.num]);
    result
}

/// Runs one synchronous L0→L1 compaction round outside of the background
/// workers — used by the engine's `runCompaction(0)` debug hook and by
/// tests that want a deterministic single pass. Returns whether a round
/// actually ran.
pub fn run_l0_once(
    root: &Path,
    config: &Config,
    levels: &Arc<Levels>,
    manifest: &Arc<Mutex<Manifest>>,
    next_segment_num: &Arc<AtomicU64>,
) -> Result<bool, CompactionError> {
    let shared = Shared {
        root: root.to_path_buf(),
        config: config.clone(),
        levels: Arc::clone(levels),
        manifest: Arc::clone(manifest),
        next_segment_num: Arc::clone(next_segment_num),
        stop: AtomicBool::new(false),
        ln_cursor: Mutex::new(HashMap::new()),
    };
    run_l0_round(&shared)
}

/// Runs one synchronous L>=1 compaction round outside of the background
/// workers — used by the engine's `runCompaction(n)` debug hook for
/// `n >= 1`. As with the background worker, the level actually compacted
/// is whichever scores highest, not necessarily `n` itself.
pub fn run_ln_once(
    root: &Path,
    config: &Config,
    levels: &Arc<Levels>,
    manifest: &Arc<Mutex<Manifest>>,
    next_segment_num: &Arc<AtomicU64>,
) -> Result<bool, CompactionError> {
    let shared = Shared {
        root: root.to_path_buf(),
        config: config.clone(),
        levels: Arc::clone(levels),
        manifest: Arc::clone(manifest),
        next_segment_num: Arc::clone(next_segment_num),
        stop: AtomicBool::new(false),
        ln_cursor: Mutex::new(HashMap::new()),
    };
    run_ln_round(&shared)
}

/// Owns the two background compaction threads. Dropping without calling
/// [`Compactor::stop`] leaves the threads running; `stop` signals both and
/// joins them.
pub struct Compactor {
    shared: Arc<Shared>,
    l0_handle: Option<JoinHandle<()>>,
    ln_handle: Option<JoinHandle<()>>,
}

impl Compactor {
    /// Spawns the L0 and L>=1 worker threads. `root` is the directory
    /// holding each level's `level<n>/` subdirectory.
    #[must_use]
    pub fn spawn(
        root: PathBuf,
        config: Config,
        levels: Arc<Levels>,
        manifest: Arc<Mutex<Manifest>>,
        next_segment_num: Arc<AtomicU64>,
    ) -> Self {
        let shared = Arc::new(Shared {
            root,
            config,
            levels,
            manifest,
            next_segment_num,
            stop: AtomicBool::new(false),
            ln_cursor: Mutex::new(HashMap::new()),
        });

        let sleep_ms = shared.config.sleep_between_compactions_ms;

        let l0_shared = Arc::clone(&shared);
        let l0_handle = std::thread::spawn(move || {
            while !l0_shared.stop.load(Ordering::Relaxed) {
                match run_l0_round(&l0_shared) {
                    Ok(true) => {}
                    Ok(false) => std::thread::sleep(Duration::from_millis(sleep_ms.max(1))),
                    Err(_) => std::thread::sleep(Duration::from_millis(sleep_ms.max(1))),
                }
            }
        });

        let ln_shared = Arc::clone(&shared);
        let ln_handle = std::thread::spawn(move || {
            while !ln_shared.stop.load(Ordering::Relaxed) {
                match run_ln_round(&ln_shared) {
                    Ok(true) => {}
                    Ok(false) => std::thread::sleep(Duration::from_millis(sleep_ms.max(1))),
                    Err(_) => std::thread::sleep(Duration::from_millis(sleep_ms.max(1))),
                }
            }
        });

        Self {
            shared,
            l0_handle: Some(l0_handle),
            ln_handle: Some(ln_handle),
        }
    }

    /// Returns whether either worker currently has a segment marked as
    /// being compacted — used by the throttler to gauge backlog.
    #[must_use]
    pub fn levels(&self) -> &Arc<Levels> {
        &self.shared.levels
    }

    /// Signals both workers to stop and joins them.
    pub fn stop(mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.l0_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.ln_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.l0_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.ln_handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests;
