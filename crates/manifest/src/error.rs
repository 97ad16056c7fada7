use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest corrupt: {0}")]
    Corrupt(String),
}
