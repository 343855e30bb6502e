pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("upload transport request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("FTPS error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("parquet write failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image store error fetching archive: {0}")]
    Imaging(#[from] pixl_imaging::ImagingError),

    #[error("hashing service error: {0}")]
    Hasher(#[from] pixl_anon::AnonError),

    #[error("unsupported destination: {0}")]
    UnsupportedDestination(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
