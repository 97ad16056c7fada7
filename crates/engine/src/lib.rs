//! # Engine — the storage engine
//!
//! Ties together [`memtable`], [`wal`], [`segment`], [`manifest`],
//! [`levels`], and [`compaction`] into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                       ENGINE                          │
//! │                                                        │
//! │ write.rs → WAL append → Memtable insert                │
//! │               |                                        │
//! │               |  (WAL past max_wal_size?)               │
//! │               v                                        │
//! │           flush() → new L0 segments                      │
//! │                                                        │
//! │ compaction crate (background threads):                │
//! │   L0 worker  → folds L0 + overlapping L1 into L1        │
//! │   L>=1 worker → folds whichever level is over budget    │
//! │                 into the level below                    │
//! │                                                        │
//! │ read.rs → Memtable → L0 → L1 → ... → L(numLevels-1)      │
//! │            (first match wins)                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crash Safety
//!
//! Every write reaches the WAL before the memtable. A flush installs the new
//! WAL generation and memtable before the old WAL generation is deleted, so
//! a crash mid-flush always leaves something replayable. Segment and
//! manifest writes use the same write-tmp-fsync-rename idiom.

mod error;
mod read;
mod recovery;
mod stats;
mod throttle;
mod write;

pub use error::EngineError;
pub use stats::{LevelStats, Stats};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use compaction::Compactor;
use config::Config;
use levels::Levels;
use manifest::Manifest;
use memtable::Memtable;
use wal::WalWriter;

fn level_dir(root: &Path, level: usize) -> PathBuf {
    root.join(format!("level{level}"))
}

fn manifest_path(level: usize, num: u64) -> String {
    format!("level{level}/seg{num:020}")
}

fn parse_manifest_path(path: &str) -> Option<(usize, u64)> {
    let (level_part, seg_part) = path.split_once('/')?;
    let level: usize = level_part.strip_prefix("level")?.parse().ok()?;
    let num: u64 = seg_part.strip_prefix("seg")?.parse().ok()?;
    Some((level, num))
}

/// The active memtable and the WAL generation it's backed by, guarded
/// together so a flush swap is visible to readers/writers atomically.
struct WriteState {
    memtable: Memtable,
    wal: Option<WalWriter>,
}

/// The central storage engine.
///
/// Construct with [`Engine::open`]; call [`Engine::stop`] (or let it drop)
/// to shut down the background compactor and throttler cleanly.
pub struct Engine {
    dir: PathBuf,
    wal_dir: PathBuf,
    config: Config,
    state: Mutex<WriteState>,
    levels: Arc<Levels>,
    manifest: Arc<Mutex<Manifest>>,
    next_segment_num: Arc<AtomicU64>,
    compactor: Mutex<Option<Compactor>>,
    throttle_sleep_nanos: Arc<AtomicU64>,
    throttle_handle: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.dir)
            .field("num_levels", &self.config.num_levels)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

impl Engine {
    /// Opens (creating if absent) the engine rooted at `dir`. Replays any
    /// leftover WAL generations, loads live segments from the manifest, and
    /// starts the background compactor and (if `config.enable_throttling`)
    /// throttler threads.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        let wal_dir = dir.join("wal");
        std::fs::create_dir_all(&dir)?;
        std::fs::create_dir_all(&wal_dir)?;
        for level in 0..config.num_levels {
            std::fs::create_dir_all(level_dir(&dir, level))?;
        }

        let recovered = recovery::recover(&dir, &wal_dir, &config)?;

        let levels = Arc::new(recovered.levels);
        let manifest = Arc::new(Mutex::new(recovered.manifest));
        let next_segment_num = Arc::new(AtomicU64::new(recovered.next_segment_num));

        let compactor = Compactor::spawn(
            dir.clone(),
            config.clone(),
            Arc::clone(&levels),
            Arc::clone(&manifest),
            Arc::clone(&next_segment_num),
        );

        let throttle_sleep_nanos = Arc::new(AtomicU64::new(0));
        let stopped = Arc::new(AtomicBool::new(false));

        let throttle_handle = if config.enable_throttling {
            Some(throttle::spawn(
                Arc::clone(&levels),
                config.clone(),
                Arc::clone(&throttle_sleep_nanos),
                Arc::clone(&stopped),
            ))
        } else {
            None
        };

        Ok(Self {
            dir,
            wal_dir,
            config,
            state: Mutex::new(WriteState {
                memtable: recovered.memtable,
                wal: Some(recovered.wal_writer),
            }),
            levels,
            manifest,
            next_segment_num,
            compactor: Mutex::new(Some(compactor)),
            throttle_sleep_nanos,
            throttle_handle: Mutex::new(throttle_handle),
            stopped,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one synchronous compaction round against `level`, bypassing the
    /// background workers. `level == 0` runs the L0→L1 worker; any other
    /// value runs the L>=1 worker, which — same as the background thread —
    /// picks whichever level actually scores highest, not necessarily
    /// `level` itself. Returns whether a round ran.
    pub fn run_compaction(&self, level: usize) -> Result<bool, EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        let ran = if level == 0 {
            compaction::run_l0_once(&self.dir, &self.config, &self.levels, &self.manifest, &self.next_segment_num)?
        } else {
            compaction::run_ln_once(&self.dir, &self.config, &self.levels, &self.manifest, &self.next_segment_num)?
        };
        Ok(ran)
    }

    /// Signals the background compactor and throttler to stop and joins
    /// them. Idempotent — safe to call more than once, and called again
    /// (harmlessly) by `Drop`.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(compactor) = self.compactor.lock().expect("compactor lock poisoned").take() {
            compactor.stop();
        }
        if let Some(handle) = self.throttle_handle.lock().expect("throttle handle lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
