//! Point-in-time engine statistics, exposed for diagnostics and the CLI's
//! `STATS` command.

use std::fmt;

use crate::Engine;

/// Segment count, total bytes, and key count for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStats {
    pub level: usize,
    pub segment_count: usize,
    pub total_bytes: u64,
    pub key_count: u64,
}

/// A snapshot of the engine's current memtable and per-level state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub memtable_entries: usize,
    pub memtable_approx_size: usize,
    pub levels: Vec<LevelStats>,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "memtable: {} entries, ~{} bytes",
            self.memtable_entries, self.memtable_approx_size
        )?;
        for level in &self.levels {
            writeln!(
                f,
                "L{}: {} segments, {} bytes, {} keys",
                level.level, level.segment_count, level.total_bytes, level.key_count
            )?;
        }
        Ok(())
    }
}

impl Engine {
    /// Takes a point-in-time snapshot of memtable and per-level statistics.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let (memtable_entries, memtable_approx_size) = {
            let state = self.state.lock().expect("write state lock poisoned");
            (state.memtable.len(), state.memtable.approx_size())
        };

        let levels = (0..self.levels.num_levels())
            .map(|level| {
                let snapshot = self.levels.snapshot(level);
                LevelStats {
                    level,
                    segment_count: snapshot.segment_count(),
                    total_bytes: snapshot.total_bytes(),
                    key_count: snapshot.segments_iter().map(|s| s.key_count as u64).sum(),
                }
            })
            .collect();

        Stats {
            memtable_entries,
            memtable_approx_size,
            levels,
        }
    }
}
