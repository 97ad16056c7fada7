//! Opens and queries an existing segment file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::block;
use crate::entry::KeyValueEntry;
use crate::format::{BlockHandle, Footer};
use crate::SegmentError;

/// A read handle onto one on-disk segment file.
///
/// The block index is loaded fully into memory as a `BTreeMap` keyed by
/// each block's start key, giving `O(log n)` floor lookups. The file
/// handle itself is kept open behind a `Mutex` (matching the approach the
/// teacher repo's `SSTableReader` uses) rather than reopened per lookup.
#[derive(Debug)]
pub struct Segment {
    pub num: u64,
    pub path: PathBuf,
    pub min_key: String,
    pub max_key: String,
    pub key_count: u32,
    pub total_bytes: u64,
    index: BTreeMap<String, BlockHandle>,
    file: Mutex<File>,
}

impl Segment {
    pub fn open(path: &Path, num: u64) -> Result<Self, SegmentError> {
        let mut file = File::open(path)?;
        let footer = Footer::read_from(&mut file)?;

        let file_len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::End(-8))?;
        let footer_body_len = {
            use byteorder::{BigEndian, ReadBytesExt};
            file.read_u32::<BigEndian>()? as u64
        };
        let footer_start = file_len - 8 - footer_body_len;

        let index_start = u64::from(footer.block_index_offset);
        let index_len = footer_start
            .checked_sub(index_start)
            .ok_or_else(|| SegmentError::Corruption("block index offset past footer".into()))?;
        file.seek(SeekFrom::Start(index_start))?;
        let mut index_region = vec![0u8; index_len as usize];
        file.read_exact(&mut index_region)?;

        let mut index = BTreeMap::new();
        let mut cur = std::io::Cursor::new(index_region);
        while (cur.position() as usize) < cur.get_ref().len() {
            let handle = BlockHandle::read_from(&mut cur)?;
            index.insert(handle.start_key.clone(), handle);
        }

        Ok(Self {
            num,
            path: path.to_path_buf(),
            min_key: footer.min_key,
            max_key: footer.max_key,
            key_count: footer.key_count,
            total_bytes: footer.total_bytes,
            index,
            file: Mutex::new(file),
        })
    }

    /// Returns whether `key` falls within this segment's `[min_key, max_key]` span.
    #[must_use]
    pub fn in_range(&self, key: &str) -> bool {
        key >= self.min_key.as_str() && key <= self.max_key.as_str()
    }

    /// Returns whether this segment's key span overlaps `[lo, hi]`.
    #[must_use]
    pub fn overlaps(&self, lo: &str, hi: &str) -> bool {
        self.min_key.as_str() <= hi && lo <= self.max_key.as_str()
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SegmentError> {
        if !self.in_range(key) {
            return Ok(None);
        }
        let Some((_, handle)) = self.index.range(..=key.to_string()).next_back() else {
            return Ok(None);
        };
        if key < handle.start_key.as_str() {
            return Ok(None);
        }

        let block_bytes = self.read_block_bytes(handle)?;
        let hit = block::lookup_in_block(&block_bytes, handle.compression, key)?;
        Ok(hit.map(|e| e.value))
    }

    fn read_block_bytes(&self, handle: &BlockHandle) -> Result<Vec<u8>, SegmentError> {
        let mut file = self.file.lock().expect("segment file mutex poisoned");
        file.seek(SeekFrom::Start(handle.offset))?;
        let mut buf = vec![0u8; handle.length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Iterates every entry in the segment, in ascending key order, for
    /// use by the compactor's merge scan.
    pub fn iter_entries(&self) -> Result<Vec<KeyValueEntry>, SegmentError> {
        let mut out = Vec::with_capacity(self.key_count as usize);
        for handle in self.index.values() {
            let block_bytes = self.read_block_bytes(handle)?;
            out.extend(block::entries_in_block(&block_bytes, handle.compression)?);
        }
        Ok(out)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.index.len()
    }
}
