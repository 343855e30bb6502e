use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixlError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Image store error: {0}")]
    ImageStore(String),

    #[error("Anonymisation error: {0}")]
    Anonymisation(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
