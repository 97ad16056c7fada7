//! Write throttler.
//!
//! Periodically checks whether L0 is falling behind compaction (segments
//! not already being compacted reaching `2 * memtable_partitions`) and
//! grows or shrinks a shared sleep duration that `set()` consults before
//! every write. Starts disabled (sleep = 0); the first breach introduces
//! `throttle_initial_sleep_nanos`, later breaches grow it by
//! `throttle_step_nanos` up to `throttle_max_sleep_nanos`, and unbreached
//! ticks shrink it back down to 0, disabling throttling again. Trades
//! write latency for giving the L0 compactor breathing room instead of
//! letting L0 grow unbounded when writes outpace it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use config::Config;
use levels::Levels;

pub(crate) fn spawn(
    levels: Arc<Levels>,
    config: Config,
    sleep_nanos: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let interval = Duration::from_millis(config.throttle_check_interval_ms.max(1));
        while !stopped.load(Ordering::Acquire) {
            std::thread::sleep(interval);
            if stopped.load(Ordering::Acquire) {
                break;
            }

            let snapshot = levels.snapshot(0);
            let behind = snapshot
                .segments_iter()
                .filter(|s| !levels.is_marked_for_compaction(0, s.num))
                .count()
                >= 2 * config.memtable_partitions;

            let current = sleep_nanos.load(Ordering::Relaxed);
            let updated = if behind {
                if current == 0 {
                    config.throttle_initial_sleep_nanos.min(config.throttle_max_sleep_nanos)
                } else {
                    (current + config.throttle_step_nanos).min(config.throttle_max_sleep_nanos)
                }
            } else {
                current.saturating_sub(config.throttle_step_nanos)
            };
            sleep_nanos.store(updated, Ordering::Relaxed);
        }
    })
}

impl crate::Engine {
    /// Sleeps for the current throttle duration, if throttling is enabled
    /// and the throttler has raised it above zero. Called once per `set`,
    /// before the write lock is taken.
    pub(crate) fn throttle_if_behind(&self) {
        if !self.config.enable_throttling {
            return;
        }
        let nanos = self.throttle_sleep_nanos.load(Ordering::Relaxed);
        if nanos > 0 {
            std::thread::sleep(Duration::from_nanos(nanos));
        }
    }
}
