pub type Result<T> = std::result::Result<T, AnonError>;

#[derive(Debug, thiserror::Error)]
pub enum AnonError {
    #[error("failed to read DICOM dataset: {0}")]
    Read(#[from] dicom_object::ReadError),

    #[error("failed to write DICOM dataset: {0}")]
    Write(#[from] dicom_object::WriteError),

    #[error("malformed tag scheme entry (0x{group:04x},0x{element:04x}): {reason}")]
    MalformedScheme {
        group: u16,
        element: u16,
        reason: String,
    },

    #[error("hashing service request failed: {0}")]
    Hasher(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
