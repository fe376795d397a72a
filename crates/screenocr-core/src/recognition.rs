use async_trait::async_trait;
use image::DynamicImage;
use screenocr_types::RecognitionFailure;

use crate::layout::Fragment;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("recognition engine timed out")]
    EngineTimeout,

    #[error("no text found")]
    NoTextFound,

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl RecognitionError {
    pub fn into_failure(self) -> RecognitionFailure {
        match self {
            RecognitionError::EngineUnavailable(detail) => {
                RecognitionFailure::EngineUnavailable(detail)
            }
            RecognitionError::EngineTimeout => RecognitionFailure::EngineTimeout,
            RecognitionError::NoTextFound => RecognitionFailure::NoTextFound,
            RecognitionError::InvalidImage(detail) => RecognitionFailure::InvalidImage(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    /// Length-weighted mean of the fragment confidences
    pub confidence: f32,
    /// Detections in crop coordinates
    pub boxes: Vec<Fragment>,
}

/// External text recognizer. Stateless between calls.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Raw detections for `image`, in its own pixel space
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Fragment>, RecognitionError>;
}
