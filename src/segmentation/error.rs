use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or running the segmentation pipeline
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Model artifact missing, corrupt, or no usable execution provider
    #[error("failed to load model {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// Input frame is empty or not 3-channel 8-bit
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Forward pass failed
    #[error("model inference failed: {0}")]
    ModelInference(String),

    /// Tensor or map has an unexpected shape
    #[error("shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        expected: &'static str,
        actual: Vec<usize>,
    },

    /// Construction parameter out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SegmentationError {
    pub fn model_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SegmentationError>;
