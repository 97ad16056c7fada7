//! # Memtable — sharded in-memory write buffer
//!
//! The first point of contact for every write. Keys are hashed into one of
//! a fixed number of shards (`config::Config::memtable_partitions`), each a
//! plain `BTreeMap<String, String>`, so a flush can process shards
//! independently and concurrent writers touching different shards don't
//! contend on the same lock.
//!
//! There is no sequence-number gating and no tombstone here — deletion is
//! out of scope, so the latest write for a key always simply overwrites
//! the previous one.
//!
//! ```text
//! Memtable
//!  ├── shard 0: BTreeMap<String, String>
//!  ├── shard 1: BTreeMap<String, String>
//!  ├── ...
//!  └── shard N-1: BTreeMap<String, String>
//! ```

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One shard of the memtable: a sorted map plus its approximate byte size.
#[derive(Debug, Default)]
pub struct Shard {
    map: BTreeMap<String, String>,
    approx_size: usize,
}

impl Shard {
    fn put(&mut self, key: String, value: String) {
        if let Some(old) = self.map.get(&key) {
            self.approx_size = self.approx_size.saturating_sub(old.len());
        } else {
            self.approx_size = self.approx_size.saturating_add(key.len());
        }
        self.approx_size = self.approx_size.saturating_add(value.len());
        self.map.insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Iterates entries in ascending key order, as required for flushing
    /// this shard into a segment.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}

/// A sharded, in-memory write buffer.
#[derive(Debug)]
pub struct Memtable {
    shards: Vec<Shard>,
}

impl Memtable {
    /// Creates an empty memtable with `partitions` shards.
    ///
    /// # Panics
    /// Panics if `partitions` is zero.
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        assert!(partitions > 0, "memtable must have at least one partition");
        Self {
            shards: (0..partitions).map(|_| Shard::default()).collect(),
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    pub fn put(&mut self, key: &str, value: &str) {
        let idx = self.shard_index(key);
        self.shards[idx].put(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let idx = self.shard_index(key);
        self.shards[idx].get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn shard(&self, idx: usize) -> &Shard {
        &self.shards[idx]
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.shards.iter().map(Shard::approx_size).sum()
    }

    /// Clears every shard. Used after a successful flush.
    pub fn clear(&mut self) {
        for shard in &mut self.shards {
            shard.clear();
        }
    }
}
