use thiserror::Error;

use manifest::ManifestError;
use segment::SegmentError;
use wal::WalError;

/// Errors surfaced by the engine's public API.
///
/// Leaf crates each report their own closed error enum; this type is the
/// union the caller actually sees, with enough structure preserved that a
/// caller can tell corruption apart from a plain I/O failure or a request
/// made after [`crate::Engine::stop`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("corruption: {0}")]
    Corruption(String),

    /// Not constructed by the read path (`get` returns `Ok(None)` for an
    /// absent key) — used internally where level/segment lookups need to
    /// distinguish "absent" from "corrupt".
    #[error("not found")]
    NotFound,

    #[error("segment already finalized")]
    SegmentFinalized,

    #[error("segment not ready")]
    SegmentNotReady,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key too large: {0} bytes (max 32767)")]
    KeyTooLarge(usize),

    #[error("value too large: {0} bytes (max 32767)")]
    ValueTooLarge(usize),

    #[error("engine is shutting down")]
    ShuttingDown,
}

impl From<SegmentError> for EngineError {
    fn from(e: SegmentError) -> Self {
        match e {
            SegmentError::Io(e) => EngineError::Io(e),
            SegmentError::CorruptRecord => EngineError::Corruption("corrupt record".into()),
            SegmentError::Corruption(s) => EngineError::Corruption(s),
            SegmentError::SegmentFinalized => EngineError::SegmentFinalized,
            SegmentError::SegmentNotReady => EngineError::SegmentNotReady,
            SegmentError::KeyTooLarge(n) => EngineError::KeyTooLarge(n),
            SegmentError::ValueTooLarge(n) => EngineError::ValueTooLarge(n),
            SegmentError::OutOfOrder => EngineError::Corruption("out-of-order keys".into()),
        }
    }
}

impl From<WalError> for EngineError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(e) => EngineError::Io(e),
            WalError::Segment(e) => e.into(),
            WalError::BadGenerationName(s) => {
                EngineError::Corruption(format!("bad wal generation name: {s}"))
            }
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Io(e) => EngineError::Io(e),
            ManifestError::Corrupt(s) => EngineError::Corruption(s),
        }
    }
}

impl From<compaction::CompactionError> for EngineError {
    fn from(e: compaction::CompactionError) -> Self {
        match e {
            compaction::CompactionError::Io(e) => EngineError::Io(e),
            compaction::CompactionError::Segment(e) => e.into(),
            compaction::CompactionError::Manifest(e) => e.into(),
        }
    }
}
