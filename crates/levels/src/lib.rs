//! # Levels — per-level segment sets
//!
//! `L0` holds segments in the order they were flushed, newest first, and
//! segments may overlap in key range — a lookup has to check every L0
//! segment until it finds a hit. Every level `L >= 1` holds segments keyed
//! by their minimum key in a `BTreeMap`, with the invariant that no two
//! segments in the same level overlap, so a lookup is a single floor-key
//! probe.
//!
//! Each level is stored as `RwLock<Arc<Level>>`. Readers take the read
//! lock just long enough to clone the `Arc`, then release it and work
//! against their own private snapshot — a concurrent compaction swapping
//! in a new `Level` value never blocks an in-flight reader, and never
//! invalidates the segments that reader already has `Arc` handles to.
//! Mutations (`add_segment`, `replace_segments`) build a new `Level` value
//! functionally from the old one and swap it in under the write lock, so
//! the previous snapshot — and every segment it references — stays alive
//! for as long as any reader holds it.
//!
//! Deleting the backing file of a compacted-away segment is the
//! compactor's job, not this crate's: it can unlink the file the moment
//! compaction finishes, because on a POSIX filesystem an open file
//! descriptor (held inside a still-alive `Arc<Segment>`) keeps working
//! fine after its directory entry is removed. The actual bytes are freed
//! once the last such descriptor closes, i.e. once the last `Arc<Segment>`
//! referencing it drops — which happens naturally as old `Level` snapshots
//! go out of scope.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use segment::{Segment, SegmentError};

/// One level's current set of segments.
#[derive(Debug, Clone)]
pub enum Level {
    /// L0: unordered, overlap allowed, newest segment first.
    L0 { segments: Vec<Arc<Segment>> },
    /// L>=1: keyed by minimum key, no two segments overlap.
    Keyed { segments: BTreeMap<String, Arc<Segment>> },
}

impl Level {
    #[must_use]
    pub fn empty_l0() -> Self {
        Level::L0 { segments: Vec::new() }
    }

    #[must_use]
    pub fn empty_keyed() -> Self {
        Level::Keyed { segments: BTreeMap::new() }
    }

    #[must_use]
    pub fn is_l0(&self) -> bool {
        matches!(self, Level::L0 { .. })
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        match self {
            Level::L0 { segments } => segments.len(),
            Level::Keyed { segments } => segments.len(),
        }
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.segments_iter().map(|s| s.total_bytes).sum()
    }

    /// Segments in this level, in lookup priority order (newest first for
    /// L0, ascending key order for keyed levels).
    pub fn segments_iter(&self) -> Box<dyn Iterator<Item = &Arc<Segment>> + '_> {
        match self {
            Level::L0 { segments } => Box::new(segments.iter()),
            Level::Keyed { segments } => Box::new(segments.values()),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SegmentError> {
        match self {
            Level::L0 { segments } => {
                for seg in segments {
                    if let Some(value) = seg.get(key)? {
                        return Ok(Some(value));
                    }
                }
                Ok(None)
            }
            Level::Keyed { segments } => {
                let Some((_, seg)) = segments.range(..=key.to_string()).next_back() else {
                    return Ok(None);
                };
                if !seg.in_range(key) {
                    return Ok(None);
                }
                seg.get(key)
            }
        }
    }

    /// Segments whose key span overlaps `[lo, hi]`.
    #[must_use]
    pub fn overlapping_segments(&self, lo: &str, hi: &str) -> Vec<Arc<Segment>> {
        self.segments_iter()
            .filter(|s| s.overlaps(lo, hi))
            .cloned()
            .collect()
    }

    /// The level's overall `[min, max]` key span, if non-empty.
    #[must_use]
    pub fn key_span(&self) -> Option<(String, String)> {
        let mut iter = self.segments_iter();
        let first = iter.next()?;
        let mut min = first.min_key.clone();
        let mut max = first.max_key.clone();
        for seg in iter {
            if seg.min_key < min {
                min = seg.min_key.clone();
            }
            if seg.max_key > max {
                max = seg.max_key.clone();
            }
        }
        Some((min, max))
    }

    /// Returns a new `Level` with `segment` added.
    #[must_use]
    pub fn with_added(&self, segment: Arc<Segment>) -> Self {
        match self {
            Level::L0 { segments } => {
                let mut segments = segments.clone();
                segments.insert(0, segment);
                Level::L0 { segments }
            }
            Level::Keyed { segments } => {
                let mut segments = segments.clone();
                segments.insert(segment.min_key.clone(), segment);
                Level::Keyed { segments }
            }
        }
    }

    /// Returns a new `Level` with every segment whose number is in `nums` removed.
    #[must_use]
    pub fn with_removed(&self, nums: &HashSet<u64>) -> Self {
        match self {
            Level::L0 { segments } => Level::L0 {
                segments: segments.iter().filter(|s| !nums.contains(&s.num)).cloned().collect(),
            },
            Level::Keyed { segments } => Level::Keyed {
                segments: segments
                    .iter()
                    .filter(|(_, s)| !nums.contains(&s.num))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
        }
    }
}

/// Aggregate view across every configured level, `L0..num_levels`.
pub struct Levels {
    levels: Vec<RwLock<Arc<Level>>>,
    compacting: Vec<Mutex<HashSet<u64>>>,
}

impl Levels {
    #[must_use]
    pub fn new(num_levels: usize) -> Self {
        assert!(num_levels >= 1, "at least one level (L0) is required");
        let mut levels = Vec::with_capacity(num_levels);
        for i in 0..num_levels {
            let initial = if i == 0 { Level::empty_l0() } else { Level::empty_keyed() };
            levels.push(RwLock::new(Arc::new(initial)));
        }
        Self {
            levels,
            compacting: (0..num_levels).map(|_| Mutex::new(HashSet::new())).collect(),
        }
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// A cheap, point-in-time snapshot of one level.
    #[must_use]
    pub fn snapshot(&self, level: usize) -> Arc<Level> {
        Arc::clone(&self.levels[level].read().expect("level lock poisoned"))
    }

    /// Looks up `key` across all levels in ascending order (L0 first),
    /// returning on the first hit.
    pub fn get(&self, key: &str) -> Result<Option<String>, SegmentError> {
        for level in &self.levels {
            let snapshot = Arc::clone(&level.read().expect("level lock poisoned"));
            if let Some(value) = snapshot.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub fn add_segment(&self, level: usize, segment: Arc<Segment>) {
        let mut guard = self.levels[level].write().expect("level lock poisoned");
        let updated = guard.with_added(segment);
        *guard = Arc::new(updated);
    }

    /// Atomically removes `remove_nums` and adds `add` within one level.
    pub fn replace_segments(&self, level: usize, remove_nums: &[u64], add: Vec<Arc<Segment>>) {
        let remove_set: HashSet<u64> = remove_nums.iter().copied().collect();
        let mut guard = self.levels[level].write().expect("level lock poisoned");
        let mut updated = guard.with_removed(&remove_set);
        for segment in add {
            updated = updated.with_added(segment);
        }
        *guard = Arc::new(updated);
    }

    pub fn mark_for_compaction(&self, level: usize, nums: &[u64]) {
        let mut set = self.compacting[level].lock().expect("compacting set lock poisoned");
        set.extend(nums.iter().copied());
    }

    pub fn unmark_for_compaction(&self, level: usize, nums: &[u64]) {
        let mut set = self.compacting[level].lock().expect("compacting set lock poisoned");
        for n in nums {
            set.remove(n);
        }
    }

    #[must_use]
    pub fn is_marked_for_compaction(&self, level: usize, num: u64) -> bool {
        self.compacting[level].lock().expect("compacting set lock poisoned").contains(&num)
    }
}
