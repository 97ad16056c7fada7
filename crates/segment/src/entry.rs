//! KeyValueEntry codec.
//!
//! On-disk encoding (big-endian): `metadata:u8 | keyLen:u16 | key | valueLen:u16 | value`.
//! Encoded length is `5 + keyLen + valueLen`. Keys and values are capped at
//! 32767 bytes each (the length prefix is a `u16`, but only half its range
//! is valid — anything above 32767 is rejected as corruption, not merely
//! truncated).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::SegmentError;

/// The only command type currently encoded in the `metadata` byte.
pub const CMD_SET: u8 = 1;

/// Maximum length, in bytes, of an encoded key or value.
pub const MAX_FIELD_LEN: usize = 32_767;

/// A single stored record: a command byte plus a key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntry {
    /// Command type. Currently always [`CMD_SET`].
    pub metadata: u8,
    pub key: String,
    pub value: String,
}

impl KeyValueEntry {
    /// Builds a `Set` entry, validating key/value length.
    pub fn set(key: String, value: String) -> Result<Self, SegmentError> {
        if key.len() > MAX_FIELD_LEN {
            return Err(SegmentError::KeyTooLarge(key.len()));
        }
        if value.len() > MAX_FIELD_LEN {
            return Err(SegmentError::ValueTooLarge(value.len()));
        }
        Ok(Self {
            metadata: CMD_SET,
            key,
            value,
        })
    }

    /// Total encoded length: `5 + keyLen + valueLen`.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        5 + self.key.len() + self.value.len()
    }

    /// Serializes this entry to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), SegmentError> {
        w.write_u8(self.metadata)?;
        w.write_u16::<BigEndian>(self.key.len() as u16)?;
        w.write_all(self.key.as_bytes())?;
        w.write_u16::<BigEndian>(self.value.len() as u16)?;
        w.write_all(self.value.as_bytes())?;
        Ok(())
    }

    /// Streaming decode. Any short read (including a read that fails partway
    /// through the header or body) or a length field above
    /// [`MAX_FIELD_LEN`] is reported as [`SegmentError::CorruptRecord`].
    ///
    /// This is the strict variant used when reading from a source that is
    /// expected to be well-formed (segment blocks decompressed in full).
    /// WAL replay, which must tolerate a crash-truncated tail record, uses
    /// [`KeyValueEntry::try_read_from`] instead.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, SegmentError> {
        match Self::try_read_from(r)? {
            Some(entry) => Ok(entry),
            None => Err(SegmentError::CorruptRecord),
        }
    }

    /// Tolerant streaming decode for WAL replay.
    ///
    /// Returns `Ok(None)` when the source is exhausted before or during a
    /// record — both a clean end-of-stream and a crash-truncated trailing
    /// record are treated identically (spec: "EOF mid-record is logged and
    /// ignored, not fatal"). Returns `Err(CorruptRecord)` only for a
    /// genuinely invalid length field — a signal of disk corruption rather
    /// than a crash-truncated append.
    pub fn try_read_from<R: Read>(r: &mut R) -> Result<Option<Self>, SegmentError> {
        let metadata = match read_u8_or_eof(r)? {
            Some(b) => b,
            None => return Ok(None),
        };

        let key_len = match read_u16_or_eof(r)? {
            Some(n) => n as usize,
            None => return Ok(None),
        };
        if key_len > MAX_FIELD_LEN {
            return Err(SegmentError::CorruptRecord);
        }
        let mut key_buf = vec![0u8; key_len];
        if r.read_exact(&mut key_buf).is_err() {
            return Ok(None);
        }

        let value_len = match read_u16_or_eof(r)? {
            Some(n) => n as usize,
            None => return Ok(None),
        };
        if value_len > MAX_FIELD_LEN {
            return Err(SegmentError::CorruptRecord);
        }
        let mut value_buf = vec![0u8; value_len];
        if r.read_exact(&mut value_buf).is_err() {
            return Ok(None);
        }

        let key = String::from_utf8(key_buf).map_err(|_| SegmentError::CorruptRecord)?;
        let value = String::from_utf8(value_buf).map_err(|_| SegmentError::CorruptRecord)?;

        Ok(Some(Self {
            metadata,
            key,
            value,
        }))
    }
}

/// Zero-copy probe over an in-memory buffer positioned at an entry.
///
/// Advances past the entry at `pos` and returns `(next_pos, entry)` where
/// `entry` is `Some` only if the encoded key matches `candidate_key`. The
/// key comparison happens on raw bytes before any allocation; the value is
/// only decoded (and the key only materialized into a `String`) on a match.
pub fn get_if_matches(
    buf: &[u8],
    pos: usize,
    candidate_key: &str,
) -> Result<(usize, Option<KeyValueEntry>), SegmentError> {
    let mut cur = Cursor::new(&buf[pos..]);
    let metadata = cur.read_u8().map_err(|_| SegmentError::CorruptRecord)?;
    let key_len = cur
        .read_u16::<BigEndian>()
        .map_err(|_| SegmentError::CorruptRecord)? as usize;
    if key_len > MAX_FIELD_LEN {
        return Err(SegmentError::CorruptRecord);
    }
    let key_start = pos + cur.position() as usize;
    let key_end = key_start + key_len;
    if key_end > buf.len() {
        return Err(SegmentError::CorruptRecord);
    }
    let key_bytes = &buf[key_start..key_end];
    cur.set_position(cur.position() + key_len as u64);

    let value_len = cur
        .read_u16::<BigEndian>()
        .map_err(|_| SegmentError::CorruptRecord)? as usize;
    if value_len > MAX_FIELD_LEN {
        return Err(SegmentError::CorruptRecord);
    }
    let value_start = pos + cur.position() as usize;
    let value_end = value_start + value_len;
    if value_end > buf.len() {
        return Err(SegmentError::CorruptRecord);
    }

    let next_pos = value_end;

    if key_bytes == candidate_key.as_bytes() {
        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| SegmentError::CorruptRecord)?
            .to_string();
        let value = std::str::from_utf8(&buf[value_start..value_end])
            .map_err(|_| SegmentError::CorruptRecord)?
            .to_string();
        Ok((
            next_pos,
            Some(KeyValueEntry {
                metadata,
                key,
                value,
            }),
        ))
    } else {
        Ok((next_pos, None))
    }
}

fn read_u8_or_eof<R: Read>(r: &mut R) -> Result<Option<u8>, SegmentError> {
    let mut buf = [0u8; 1];
    match r.read(&mut buf) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(buf[0])),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(SegmentError::Io(e)),
    }
}

fn read_u16_or_eof<R: Read>(r: &mut R) -> Result<Option<u16>, SegmentError> {
    let mut buf = [0u8; 2];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u16::from_be_bytes(buf))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(SegmentError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let e = KeyValueEntry::set("hello".into(), "world".into()).unwrap();
        let mut buf = Vec::new();
        e.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), e.encoded_len());
        let decoded = KeyValueEntry::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, e);
    }

    #[test]
    fn rejects_oversized_key() {
        let key = "x".repeat(MAX_FIELD_LEN + 1);
        let err = KeyValueEntry::set(key, "v".into()).unwrap_err();
        assert!(matches!(err, SegmentError::KeyTooLarge(_)));
    }

    #[test]
    fn try_read_handles_clean_and_truncated_eof() {
        assert!(matches!(
            KeyValueEntry::try_read_from(&mut Cursor::new(&[][..])).unwrap(),
            None
        ));

        let e = KeyValueEntry::set("k".into(), "v".into()).unwrap();
        let mut buf = Vec::new();
        e.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            KeyValueEntry::try_read_from(&mut Cursor::new(&buf)).unwrap(),
            None
        ));
    }

    #[test]
    fn get_if_matches_skips_non_matching_without_panicking() {
        let mut buf = Vec::new();
        KeyValueEntry::set("a".into(), "1".into())
            .unwrap()
            .write_to(&mut buf)
            .unwrap();
        KeyValueEntry::set("b".into(), "2".into())
            .unwrap()
            .write_to(&mut buf)
            .unwrap();

        let (pos1, hit1) = get_if_matches(&buf, 0, "zzz").unwrap();
        assert!(hit1.is_none());
        let (pos2, hit2) = get_if_matches(&buf, pos1, "b").unwrap();
        assert_eq!(hit2.unwrap().value, "2");
        assert_eq!(pos2, buf.len());
    }
}
