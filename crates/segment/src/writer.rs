//! Builds a new segment file from an ascending stream of key/value pairs.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use config::CompressionType;

use crate::block::BlockBuilder;
use crate::format::{BlockHandle, Footer};
use crate::SegmentError;

/// Metadata describing a completed segment, returned by [`SegmentWriter::done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    pub num: u64,
    pub path: PathBuf,
    pub min_key: String,
    pub max_key: String,
    pub key_count: u32,
    pub total_bytes: u64,
}

/// Streams entries into a new segment file, compressing and flushing
/// blocks as they fill, then writing the block index and footer on
/// [`SegmentWriter::done`].
///
/// Writes go to a `.tmp` sibling path first; `done()` fsyncs the file,
/// renames it into place, then best-effort fsyncs the parent directory —
/// the same crash-safety idiom used for manifest and WAL rollover.
pub struct SegmentWriter {
    num: u64,
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    compression: CompressionType,
    max_block_size: u64,
    builder: BlockBuilder,
    index: Vec<BlockHandle>,
    offset: u64,
    min_key: Option<String>,
    max_key: Option<String>,
    key_count: u32,
    done: bool,
}

impl SegmentWriter {
    pub fn create(
        dir: &Path,
        num: u64,
        compression: CompressionType,
        max_block_size: u64,
    ) -> Result<Self, SegmentError> {
        let final_path = dir.join(format!("seg{num:020}"));
        let tmp_path = dir.join(format!("seg{num:020}.tmp"));
        let file = BufWriter::new(File::create(&tmp_path)?);
        Ok(Self {
            num,
            final_path,
            tmp_path,
            file,
            compression,
            max_block_size,
            builder: BlockBuilder::new(),
            index: Vec::new(),
            offset: 0,
            min_key: None,
            max_key: None,
            key_count: 0,
            done: false,
        })
    }

    /// Appends a key/value pair. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &str, value: &str) -> Result<(), SegmentError> {
        if self.done {
            return Err(SegmentError::SegmentFinalized);
        }
        if let Some(max) = &self.max_key {
            if key <= max.as_str() {
                return Err(SegmentError::OutOfOrder);
            }
        }

        let entry = crate::entry::KeyValueEntry::set(key.to_string(), value.to_string())?;
        self.builder.push(&entry)?;

        if self.min_key.is_none() {
            self.min_key = Some(key.to_string());
        }
        self.max_key = Some(key.to_string());
        self.key_count += 1;

        if self.builder.raw_len() as u64 >= self.max_block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<(), SegmentError> {
        if self.builder.is_empty() {
            return Ok(());
        }
        let pending = self.builder.finish(self.compression)?;
        let handle = pending.handle(self.offset);
        self.file.write_all(&pending.compressed)?;
        self.offset += pending.compressed.len() as u64;
        self.index.push(handle);
        Ok(())
    }

    /// Flushes any partial block, writes the block index and footer, then
    /// atomically publishes the file. Returns `None` if no entries were
    /// ever added (an empty segment is not written).
    pub fn done(mut self) -> Result<Option<SegmentMeta>, SegmentError> {
        self.flush_block()?;
        self.done = true;

        if self.index.is_empty() {
            drop(self.file);
            let _ = fs::remove_file(&self.tmp_path);
            return Ok(None);
        }

        let block_index_offset = self.offset as u32;
        for handle in &self.index {
            handle.write_to(&mut self.file)?;
        }

        let min_key = self.min_key.clone().unwrap_or_default();
        let max_key = self.max_key.clone().unwrap_or_default();
        let footer = Footer {
            block_index_offset,
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            key_count: self.key_count,
            total_bytes: self.offset,
        };
        footer.write_to(&mut self.file)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        drop(self.file);

        fs::rename(&self.tmp_path, &self.final_path)?;
        if let Some(parent) = self.final_path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(Some(SegmentMeta {
            num: self.num,
            path: self.final_path.clone(),
            min_key,
            max_key,
            key_count: self.key_count,
            total_bytes: footer.total_bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Segment;

    #[test]
    fn writes_and_reopens_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SegmentWriter::create(dir.path(), 1, CompressionType::Lz4, 64).unwrap();
        for i in 0..50 {
            writer.add(&format!("k{i:04}"), &format!("v{i}")).unwrap();
        }
        let meta = writer.done().unwrap().unwrap();
        assert_eq!(meta.key_count, 50);
        assert_eq!(meta.min_key, "k0000");
        assert_eq!(meta.max_key, "k0049");

        let segment = Segment::open(&meta.path, meta.num).unwrap();
        assert_eq!(segment.get("k0025").unwrap().unwrap(), "v25");
        assert!(segment.get("k9999").unwrap().is_none());
    }

    #[test]
    fn rejects_out_of_order_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SegmentWriter::create(dir.path(), 1, CompressionType::None, 4096).unwrap();
        writer.add("b", "1").unwrap();
        assert!(matches!(writer.add("a", "2"), Err(SegmentError::OutOfOrder)));
    }

    #[test]
    fn empty_segment_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SegmentWriter::create(dir.path(), 1, CompressionType::None, 4096).unwrap();
        let meta = writer.done().unwrap();
        assert!(meta.is_none());
    }
}
