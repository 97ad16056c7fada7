//! # Config — tunables for the LSM storage engine
//!
//! A plain data struct carrying every knob listed in the engine's external
//! interface. This crate does **not** parse environment variables, CLI
//! flags, or config files — that is the job of the out-of-scope front-end.
//! `Config::default()` matches the documented defaults exactly; callers
//! construct one, tweak the fields they care about, and pass it to
//! `Engine::open`.

use std::fmt;

/// Block payload compression algorithm.
///
/// The one-byte on-disk code (`compression_code` in the block index and
/// block descriptor) is this enum's discriminant: `None = 0`, `Snappy = 1`,
/// `Lz4 = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    /// No compression; block payload is written raw.
    #[default]
    None,
    /// Google Snappy framing (native library framing, no extra length prefix).
    Snappy,
    /// LZ4 block compression; the compressed payload is prefixed with a
    /// 4-byte big-endian uncompressed length.
    Lz4,
}

impl CompressionType {
    /// Returns the one-byte on-disk code for this compression type.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Snappy => 1,
            CompressionType::Lz4 => 2,
        }
    }

    /// Decodes a one-byte on-disk compression code.
    ///
    /// Returns `None` for unrecognized codes — callers should treat that as
    /// corruption.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

/// Per-level compaction trigger policy.
///
/// L0's score is `segments_not_being_compacted / memtable_partitions`
/// against a trigger of `l0_trigger`; L≥1's score is
/// `bytes_not_being_compacted / (threshold(level) * max_segment_size)`
/// where `threshold(level) = multiplier ^ level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelThreshold {
    /// Number of L0 segments that makes the level eligible for compaction.
    pub l0_trigger: u64,
    /// Exponential base for L≥1 thresholds (`multiplier ^ level`).
    pub multiplier: u64,
}

impl LevelThreshold {
    /// Returns the compaction threshold for `level`.
    #[must_use]
    pub fn threshold(&self, level: usize) -> u64 {
        if level == 0 {
            self.l0_trigger
        } else {
            self.multiplier.saturating_pow(level as u32)
        }
    }
}

impl Default for LevelThreshold {
    fn default() -> Self {
        Self {
            l0_trigger: 4,
            multiplier: 5,
        }
    }
}

/// Full configuration for an [`Engine`](../engine/struct.Engine.html).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Block payload compression. Default: `None`.
    pub compression_type: CompressionType,
    /// Cap per output segment, in bytes. Default: 2 MiB.
    pub max_segment_size: u64,
    /// Cap per block before flush, in bytes. Default: 100 KiB.
    pub max_block_size: u64,
    /// WAL byte size that triggers a memtable flush.
    ///
    /// Default: derived as `4 MiB * memtable_partitions`, scaled up for
    /// compression so that flush cadence stays roughly constant across
    /// compression settings (compressed segments hold more logical bytes
    /// per byte flushed).
    pub max_wal_size: u64,
    /// Total number of levels (L0..numLevels-1). Default: 6.
    pub num_levels: usize,
    /// Per-level compaction trigger policy. Default: L0 at 4 segments,
    /// L≥1 at `5^level`.
    pub level_compaction_threshold: LevelThreshold,
    /// Number of memtable shards. Default: 6.
    pub memtable_partitions: usize,
    /// Sleep between compactor worker iterations, in milliseconds. Default: 1.
    pub sleep_between_compactions_ms: u64,
    /// Whether the throttler regulates `set` when compaction falls behind.
    /// Default: `true`.
    pub enable_throttling: bool,
    /// If `true`, every WAL append calls `fsync` in addition to a stream
    /// flush. Default: `false` — the default durability target is
    /// "survives process crash", not "survives OS crash" (spec.md §4.6,
    /// §9 open question (b)).
    pub wal_fsync: bool,
    /// Cap on the number of overlapping L0 segments folded into one L0→L1
    /// compaction batch. Default: 10 (unmotivated but tunable, spec.md §9
    /// open question (c)).
    pub l0_overlap_cap: usize,
    /// Cap on grandchild segments (or bytes, as a multiple of
    /// `max_segment_size`) an output segment's key span may overlap before
    /// the compactor rolls over to a new output segment. Default: 10.
    pub grandchild_overlap_cap: usize,
    /// Throttler check interval, in milliseconds. Default: 1000.
    pub throttle_check_interval_ms: u64,
    /// Throttle sleep introduced the moment L0 first falls behind, in
    /// nanoseconds. Sleep starts at 0 (throttling disabled) and is set to
    /// this value on the first breach; later breaches grow it further, and
    /// it shrinks back to 0 once L0 catches up. Default: 10,000 (10µs).
    pub throttle_initial_sleep_nanos: u64,
    /// Maximum throttle sleep, in nanoseconds. Default: 1,000,000 (1ms).
    pub throttle_max_sleep_nanos: u64,
    /// Amount the throttle sleep grows/shrinks per tick, in nanoseconds.
    /// Default: 10,000 (10µs).
    pub throttle_step_nanos: u64,
}

impl Default for Config {
    fn default() -> Self {
        let memtable_partitions = 6;
        Self {
            compression_type: CompressionType::None,
            max_segment_size: 2 * 1024 * 1024,
            max_block_size: 100 * 1024,
            max_wal_size: 4 * 1024 * 1024 * memtable_partitions as u64,
            num_levels: 6,
            level_compaction_threshold: LevelThreshold::default(),
            memtable_partitions,
            sleep_between_compactions_ms: 1,
            enable_throttling: true,
            wal_fsync: false,
            l0_overlap_cap: 10,
            grandchild_overlap_cap: 10,
            throttle_check_interval_ms: 1000,
            throttle_initial_sleep_nanos: 10_000,
            throttle_max_sleep_nanos: 1_000_000,
            throttle_step_nanos: 10_000,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config(compression={:?}, max_segment_size={}, max_block_size={}, \
             max_wal_size={}, num_levels={}, memtable_partitions={})",
            self.compression_type,
            self.max_segment_size,
            self.max_block_size,
            self.max_wal_size,
            self.num_levels,
            self.memtable_partitions
        )
    }
}

#[cfg(test)]
mod tests;
