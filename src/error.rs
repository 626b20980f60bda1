//! Error types for the dermalens classifier.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the dermalens crate.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Model construction or forward-pass error
    #[error("Model error: {0}")]
    Model(String),

    /// Dataset discovery, metadata, or split error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error (names the offending value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint file does not exist. Recoverable at startup: the service
    /// may proceed with untrained weights.
    #[error("Checkpoint not found: {0}")]
    CheckpointMissing(PathBuf),

    /// Checkpoint exists but its contents could not be decoded.
    #[error("Checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    /// Checkpoint weights do not fit the constructed model (wrong
    /// num_classes or backbone). Never partially loaded.
    #[error("Checkpoint shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid request input (non-image upload, resolution out of range)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected failure during preprocessing or the forward pass
    #[error("Inference error: {0}")]
    Inference(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Dataset(err.to_string())
    }
}

impl Error {
    /// True if the failure is the caller's fault (maps to an HTTP 4xx).
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Image(_))
    }
}

/// Specialized Result type for dermalens operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Model("test error".to_string());
        assert_eq!(err.to_string(), "Model error: test error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_client_fault_classification() {
        assert!(Error::InvalidInput("not an image".into()).is_client_fault());
        assert!(Error::Image("truncated".into()).is_client_fault());
        assert!(!Error::Inference("forward pass".into()).is_client_fault());
        assert!(!Error::CheckpointMissing(PathBuf::from("x")).is_client_fault());
    }
}
