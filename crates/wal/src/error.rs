use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Segment(#[from] segment::SegmentError),

    #[error("wal generation filename is not parseable: {0}")]
    BadGenerationName(String),
}
