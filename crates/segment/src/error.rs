use thiserror::Error;

/// Errors produced while reading or writing segment files.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record")]
    CorruptRecord,

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("segment already finalized")]
    SegmentFinalized,

    #[error("segment not ready")]
    SegmentNotReady,

    #[error("key too large: {0} bytes")]
    KeyTooLarge(usize),

    #[error("value too large: {0} bytes")]
    ValueTooLarge(usize),

    #[error("keys supplied out of order")]
    OutOfOrder,
}
