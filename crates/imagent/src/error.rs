// Error types for imagent

use thiserror::Error;

/// Result type for imagent operations
pub type Result<T> = std::result::Result<T, ImageGenError>;

/// Errors that can occur while loading a model or generating images
#[derive(Error, Debug)]
pub enum ImageGenError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Model loading error: {0}")]
    ModelLoading(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HuggingFace Hub error: {0}")]
    HfHub(String),
}

impl From<hf_hub::api::sync::ApiError> for ImageGenError {
    fn from(err: hf_hub::api::sync::ApiError) -> Self {
        ImageGenError::HfHub(err.to_string())
    }
}
