//! Segment on-disk format: footer, block index, compression framing.
//!
//! ```text
//! +-------------------+
//! | block 0           |
//! +-------------------+
//! | block 1           |
//! +-------------------+
//! | ...                |
//! +-------------------+
//! | block index        |  startKeyLen:u16 | startKey | offset:u32 | length:u32 | compression:u8  (repeated)
//! +-------------------+
//! | footer (fixed)      |  blockIndexOffset:u32 | minKey | maxKey | keyCount:u32 | totalBytes:u64 | magic:u32
//! +-------------------+
//! ```
//!
//! The footer is variable-length (it embeds `minKey`/`maxKey`), so a reader
//! locates it by reading the trailing fixed-size tail — `magic` is the very
//! last four bytes of the file — then walking backward.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use config::CompressionType;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::SegmentError;

/// `"LDB!"` as a big-endian u32 — written as the final four bytes of every segment file.
pub const MAGIC: u32 = 0x4C44_4221;

/// One entry in the block index: the first key of a block plus where to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHandle {
    pub start_key: String,
    pub offset: u64,
    pub length: u32,
    pub compression: CompressionType,
}

impl BlockHandle {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), SegmentError> {
        w.write_u16::<BigEndian>(self.start_key.len() as u16)?;
        w.write_all(self.start_key.as_bytes())?;
        w.write_u32::<BigEndian>(self.offset as u32)?;
        w.write_u32::<BigEndian>(self.length)?;
        w.write_u8(self.compression.code())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, SegmentError> {
        let key_len = r.read_u16::<BigEndian>()? as usize;
        let mut key_buf = vec![0u8; key_len];
        r.read_exact(&mut key_buf)?;
        let start_key = String::from_utf8(key_buf).map_err(|_| SegmentError::CorruptRecord)?;
        let offset = r.read_u32::<BigEndian>()? as u64;
        let length = r.read_u32::<BigEndian>()?;
        let code = r.read_u8()?;
        let compression = CompressionType::from_code(code)
            .ok_or_else(|| SegmentError::Corruption(format!("unknown compression code {code}")))?;
        Ok(Self {
            start_key,
            offset,
            length,
            compression,
        })
    }
}

/// The fixed-size-except-for-keys trailer of a segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub block_index_offset: u32,
    pub min_key: String,
    pub max_key: String,
    pub key_count: u32,
    pub total_bytes: u64,
}

impl Footer {
    /// Serializes the footer. A trailing `u32` footer length is written
    /// just before the magic number so a reader can locate the (variable
    /// length, due to `minKey`/`maxKey`) footer's start with a single
    /// backward seek instead of a scan.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), SegmentError> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(self.block_index_offset)?;
        body.write_u16::<BigEndian>(self.min_key.len() as u16)?;
        body.write_all(self.min_key.as_bytes())?;
        body.write_u16::<BigEndian>(self.max_key.len() as u16)?;
        body.write_all(self.max_key.as_bytes())?;
        body.write_u32::<BigEndian>(self.key_count)?;
        body.write_u64::<BigEndian>(self.total_bytes)?;

        w.write_all(&body)?;
        w.write_u32::<BigEndian>(body.len() as u32)?;
        w.write_u32::<BigEndian>(MAGIC)?;
        Ok(())
    }

    /// Locates and decodes the footer of an already-open segment file.
    pub fn read_from<F: Read + Seek>(file: &mut F) -> Result<Self, SegmentError> {
        let file_len = file.seek(SeekFrom::End(0))?;
        if file_len < 8 {
            return Err(SegmentError::Corruption("file too small for footer".into()));
        }
        file.seek(SeekFrom::End(-8))?;
        let footer_len = file.read_u32::<BigEndian>()? as u64;
        let magic = file.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(SegmentError::Corruption(format!(
                "bad magic: expected {MAGIC:#x}, got {magic:#x}"
            )));
        }

        let footer_start = file_len
            .checked_sub(8 + footer_len)
            .ok_or_else(|| SegmentError::Corruption("footer length exceeds file size".into()))?;
        file.seek(SeekFrom::Start(footer_start))?;
        let mut body = vec![0u8; footer_len as usize];
        file.read_exact(&mut body)?;

        let mut cur = std::io::Cursor::new(body);
        let block_index_offset = cur.read_u32::<BigEndian>()?;
        let min_key_len = cur.read_u16::<BigEndian>()? as usize;
        let mut min_key_buf = vec![0u8; min_key_len];
        cur.read_exact(&mut min_key_buf)?;
        let min_key = String::from_utf8(min_key_buf).map_err(|_| SegmentError::CorruptRecord)?;
        let max_key_len = cur.read_u16::<BigEndian>()? as usize;
        let mut max_key_buf = vec![0u8; max_key_len];
        cur.read_exact(&mut max_key_buf)?;
        let max_key = String::from_utf8(max_key_buf).map_err(|_| SegmentError::CorruptRecord)?;
        let key_count = cur.read_u32::<BigEndian>()?;
        let total_bytes = cur.read_u64::<BigEndian>()?;

        Ok(Footer {
            block_index_offset,
            min_key,
            max_key,
            key_count,
            total_bytes,
        })
    }
}

/// Compresses `raw` per `compression`.
///
/// LZ4 payloads are prefixed with a 4-byte **big-endian** uncompressed
/// length (not `lz4_flex`'s own little-endian `compress_prepend_size`
/// framing, to stay consistent with the rest of this format's byte order).
pub fn compress(raw: &[u8], compression: CompressionType) -> Result<Vec<u8>, SegmentError> {
    match compression {
        CompressionType::None => Ok(raw.to_vec()),
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(raw)
            .map_err(|e| SegmentError::Corruption(format!("snappy compress failed: {e}"))),
        CompressionType::Lz4 => {
            let compressed = lz4_flex::block::compress(raw);
            let mut out = Vec::with_capacity(4 + compressed.len());
            out.write_u32::<BigEndian>(raw.len() as u32)?;
            out.extend_from_slice(&compressed);
            Ok(out)
        }
    }
}

/// Inverse of [`compress`].
pub fn decompress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>, SegmentError> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| SegmentError::Corruption(format!("snappy decompress failed: {e}"))),
        CompressionType::Lz4 => {
            if data.len() < 4 {
                return Err(SegmentError::Corruption("lz4 block missing length prefix".into()));
            }
            let uncompressed_len = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
            lz4_flex::block::decompress(&data[4..], uncompressed_len)
                .map_err(|e| SegmentError::Corruption(format!("lz4 decompress failed: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn footer_roundtrip() {
        let footer = Footer {
            block_index_offset: 12345,
            min_key: "aaa".into(),
            max_key: "zzz".into(),
            key_count: 42,
            total_bytes: 99999,
        };
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();
        assert_eq!(&buf[buf.len() - 4..], &MAGIC.to_be_bytes());

        let mut cur = Cursor::new(buf);
        let decoded = Footer::read_from(&mut cur).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn footer_empty_keys_roundtrip() {
        let footer = Footer {
            block_index_offset: 0,
            min_key: String::new(),
            max_key: String::new(),
            key_count: 0,
            total_bytes: 0,
        };
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        let decoded = Footer::read_from(&mut cur).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = vec![0u8; 20];
        buf.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        let mut cur = Cursor::new(buf);
        assert!(Footer::read_from(&mut cur).is_err());
    }

    #[test]
    fn compression_roundtrip_all_kinds() {
        let raw = b"the quick brown fox jumps over the lazy dog".repeat(20);
        for kind in [
            CompressionType::None,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let compressed = compress(&raw, kind).unwrap();
            let decompressed = decompress(&compressed, kind).unwrap();
            assert_eq!(decompressed, raw);
        }
    }

    #[test]
    fn block_handle_roundtrip() {
        let handle = BlockHandle {
            start_key: "start".into(),
            offset: 4096,
            length: 2048,
            compression: CompressionType::Lz4,
        };
        let mut buf = Vec::new();
        handle.write_to(&mut buf).unwrap();
        let decoded = BlockHandle::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, handle);
    }
}
