/// Result type alias for Image Store Adapter operations.
pub type Result<T> = std::result::Result<T, ImagingError>;

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("Orthanc request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Orthanc returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("VNA query for {mrn}/{accession_number} returned no matches")]
    NoVnaMatch { mrn: String, accession_number: String },

    #[error("C-MOVE job {job_id} failed")]
    JobFailed { job_id: String },

    #[error("C-MOVE job {job_id} did not complete within {timeout_secs}s")]
    JobTimedOut { job_id: String, timeout_secs: u64 },

    #[error("Orthanc raw has pending jobs; try again later")]
    PendingJobs,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
