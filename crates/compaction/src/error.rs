use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Segment(#[from] segment::SegmentError),

    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),
}
