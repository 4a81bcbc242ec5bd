//! Error types for handframe

use thiserror::Error;

/// Errors that can occur while building, running or delivering a session
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse landmark input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Classifier error: {0}")]
    ClassifierError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Upload rejected by server: {0}")]
    UploadRejected(String),

    #[error("Pipeline worker is no longer running")]
    PipelineClosed,

    #[error("Timed out: {0}")]
    Timeout(String),
}
