//! Error type for the cache/download pipeline.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry not found: {0:?}/{1}")]
    NotFound(sig_types::CacheKind, String),

    #[error("integrity check failed for {0:?}/{1}: expected md5 {2}, got {3}")]
    IntegrityMismatch(sig_types::CacheKind, String, String, String),

    #[error("download failed after retries for {0:?}/{1}: {2}")]
    DownloadFailed(sig_types::CacheKind, String, String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
