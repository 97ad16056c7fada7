//! N-way ascending merge across segment entry streams.
//!
//! Used by the compactor to stream entries from several segments into one
//! output segment without materializing the union in memory. Ties (same
//! key present in more than one input) are broken by segment recency —
//! the segment with the higher `num` wins, since segment numbers are
//! assigned in creation order and a higher number is always newer.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::entry::KeyValueEntry;

/// One still-live cursor into a single segment's entry stream.
struct Source {
    segment_num: u64,
    entries: std::vec::IntoIter<KeyValueEntry>,
    head: Option<KeyValueEntry>,
}

impl Source {
    fn new(segment_num: u64, mut entries: std::vec::IntoIter<KeyValueEntry>) -> Option<Self> {
        let head = entries.next()?;
        Some(Self {
            segment_num,
            entries,
            head: Some(head),
        })
    }

    fn advance(&mut self) -> bool {
        self.head = self.entries.next();
        self.head.is_some()
    }
}

struct HeapEntry {
    key: String,
    segment_num: u64,
    source_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.segment_num == other.segment_num
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on key; on equal keys, higher segment_num
        // (newer) should pop first, so compare it in forward order.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.segment_num.cmp(&other.segment_num))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges multiple `(segment_num, entries)` streams into one ascending
/// stream, keeping only the newest value for each key.
///
/// `inputs` must list each segment's entries already in ascending key
/// order (as produced by `Segment::iter_entries`); `segment_num` is used
/// purely for recency tie-breaking, not for ordering within a segment.
pub struct MergeIterator {
    heap: BinaryHeap<HeapEntry>,
    sources: Vec<Source>,
}

impl MergeIterator {
    #[must_use]
    pub fn new(inputs: Vec<(u64, Vec<KeyValueEntry>)>) -> Self {
        let mut sources = Vec::new();
        let mut heap = BinaryHeap::new();
        for (segment_num, entries) in inputs {
            if let Some(source) = Source::new(segment_num, entries.into_iter()) {
                let idx = sources.len();
                heap.push(HeapEntry {
                    key: source.head.as_ref().unwrap().key.clone(),
                    segment_num: source.segment_num,
                    source_idx: idx,
                });
                sources.push(source);
            }
        }
        Self { heap, sources }
    }

    /// Pops the next key in ascending order, returning the entry from the
    /// newest segment among all sources currently holding that key, and
    /// advances (and re-pushes) every source that held it.
    fn next_entry(&mut self) -> Option<KeyValueEntry> {
        let top = self.heap.pop()?;
        let key = top.key.clone();

        let mut winner: Option<(u64, usize)> = Some((top.segment_num, top.source_idx));
        self.advance_and_requeue(top.source_idx);

        while let Some(next) = self.heap.peek() {
            if next.key != key {
                break;
            }
            let next = self.heap.pop().unwrap();
            if winner.map_or(true, |(num, _)| next.segment_num > num) {
                winner = Some((next.segment_num, next.source_idx));
            }
            self.advance_and_requeue(next.source_idx);
        }

        let (_, winning_idx) = winner.unwrap();
        self.sources[winning_idx].head.clone()
    }

    fn advance_and_requeue(&mut self, idx: usize) {
        let source = &mut self.sources[idx];
        let had_head = source.head.take();
        if had_head.is_some() && source.advance() {
            self.heap.push(HeapEntry {
                key: source.head.as_ref().unwrap().key.clone(),
                segment_num: source.segment_num,
                source_idx: idx,
            });
        }
    }
}

impl Iterator for MergeIterator {
    type Item = KeyValueEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<KeyValueEntry> {
        pairs
            .iter()
            .map(|(k, v)| KeyValueEntry::set((*k).to_string(), (*v).to_string()).unwrap())
            .collect()
    }

    #[test]
    fn merges_disjoint_sources_in_order() {
        let a = entries(&[("a", "1"), ("c", "3")]);
        let b = entries(&[("b", "2"), ("d", "4")]);
        let merged: Vec<_> = MergeIterator::new(vec![(1, a), (2, b)]).collect();
        let keys: Vec<_> = merged.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn newer_segment_wins_on_duplicate_key() {
        let old = entries(&[("k", "old")]);
        let new = entries(&[("k", "new")]);
        // old has the higher segment_num but lower recency in this setup —
        // recency is defined purely by segment_num, so pass new with num=2.
        let merged: Vec<_> = MergeIterator::new(vec![(1, old), (2, new)]).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, "new");
    }

    #[test]
    fn empty_sources_are_skipped() {
        let merged: Vec<_> = MergeIterator::new(vec![(1, Vec::new()), (2, entries(&[("a", "1")]))]).collect();
        assert_eq!(merged.len(), 1);
    }
}
