//! Error types for fusion scoring

use thiserror::Error;

/// Result type for fusion scoring operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Errors surfaced by the prediction pipeline
#[derive(Error, Debug)]
pub enum FusionError {
    /// Missing or malformed request data, the caller may fix and resubmit
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Image bytes could not be turned into a usable RGB image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A startup artifact is missing or corrupt
    #[error("Model unavailable: {message}")]
    ModelUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backbone or head failed during a forward pass
    #[error("Inference error: {0}")]
    Inference(String),
}

impl FusionError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        FusionError::InvalidInput(message.into())
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        FusionError::InvalidImage(message.into())
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        FusionError::ModelUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn model_unavailable_with_source(
        message: impl Into<String>,
        source: histofuse_types::Error,
    ) -> Self {
        FusionError::ModelUnavailable {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        FusionError::Inference(message.into())
    }

    /// Whether the caller can fix the request and resubmit
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            FusionError::InvalidInput(_) | FusionError::InvalidImage(_)
        )
    }
}
