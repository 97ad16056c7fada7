//! Block assembly and lookup.
//!
//! A block is a run of consecutive entries (in ascending key order) that
//! gets compressed and written as one unit. [`BlockBuilder`] accumulates
//! entries until the configured size threshold is reached; the segment
//! writer then compresses and flushes it, recording a [`BlockHandle`] in
//! the block index.

use config::CompressionType;

use crate::entry::{get_if_matches, KeyValueEntry};
use crate::format::{self, BlockHandle};
use crate::SegmentError;

/// Accumulates entries for one block.
#[derive(Debug, Default)]
pub struct BlockBuilder {
    raw: Vec<u8>,
    start_key: Option<String>,
    entry_count: usize,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Caller is responsible for ensuring keys arrive in
    /// ascending order across the whole segment.
    pub fn push(&mut self, entry: &KeyValueEntry) -> Result<(), SegmentError> {
        if self.start_key.is_none() {
            self.start_key = Some(entry.key.clone());
        }
        entry.write_to(&mut self.raw)?;
        self.entry_count += 1;
        Ok(())
    }

    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Compresses the accumulated bytes and returns them along with the
    /// start key, ready to be written at whatever offset the caller
    /// chooses. Leaves the builder empty for reuse.
    pub fn finish(&mut self, compression: CompressionType) -> Result<PendingBlock, SegmentError> {
        let start_key = self
            .start_key
            .take()
            .ok_or(SegmentError::SegmentNotReady)?;
        let compressed = format::compress(&self.raw, compression)?;
        self.raw.clear();
        self.entry_count = 0;
        Ok(PendingBlock {
            start_key,
            compressed,
            compression,
        })
    }
}

/// A compressed block ready to be written to disk.
pub struct PendingBlock {
    pub start_key: String,
    pub compressed: Vec<u8>,
    pub compression: CompressionType,
}

impl PendingBlock {
    /// Builds the block index entry for this block once its final offset
    /// in the file is known.
    #[must_use]
    pub fn handle(&self, offset: u64) -> BlockHandle {
        BlockHandle {
            start_key: self.start_key.clone(),
            offset,
            length: self.compressed.len() as u32,
            compression: self.compression,
        }
    }
}

/// Decompresses a block's raw bytes and performs a zero-copy linear scan
/// for `key`.
pub fn lookup_in_block(block_bytes: &[u8], compression: CompressionType, key: &str) -> Result<Option<KeyValueEntry>, SegmentError> {
    let decompressed = format::decompress(block_bytes, compression)?;
    let mut pos = 0;
    while pos < decompressed.len() {
        let (next_pos, hit) = get_if_matches(&decompressed, pos, key)?;
        if let Some(entry) = hit {
            return Ok(Some(entry));
        }
        pos = next_pos;
    }
    Ok(None)
}

/// Decompresses a block and decodes every entry in order, for sequential
/// scanning during compaction.
pub fn entries_in_block(block_bytes: &[u8], compression: CompressionType) -> Result<Vec<KeyValueEntry>, SegmentError> {
    let decompressed = format::decompress(block_bytes, compression)?;
    let mut cur = std::io::Cursor::new(decompressed);
    let mut out = Vec::new();
    loop {
        match KeyValueEntry::try_read_from(&mut cur)? {
            Some(entry) => out.push(entry),
            None => break,
        }
    }
    Ok(out)
}
