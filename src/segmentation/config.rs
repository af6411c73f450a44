use super::error::{Result, SegmentationError};
use std::path::PathBuf;

/// Default model input resolution as (height, width)
pub const DEFAULT_INPUT_SHAPE: (u32, u32) = (512, 896);
pub const DEFAULT_SCORE_TH: f32 = 0.5;

/// Compute backends the model loader knows how to register
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutionProviderKind {
    Cpu,
    Cuda,
    Tensorrt,
}

/// Channel order of the tensor fed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV-style order; the road model was exported against BGR frames
    Bgr,
}

/// Immutable construction parameters for the road segmentation pipeline
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    pub model_path: PathBuf,
    /// (height, width) the model expects
    pub input_shape: (u32, u32),
    pub score_th: f32,
    /// Ordered preference list; the first available backend wins
    pub providers: Vec<ExecutionProviderKind>,
    pub channel_order: ChannelOrder,
    pub intra_threads: usize,
}

impl SegmentationConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_shape: DEFAULT_INPUT_SHAPE,
            score_th: DEFAULT_SCORE_TH,
            providers: vec![ExecutionProviderKind::Cpu],
            channel_order: ChannelOrder::Bgr,
            intra_threads: 4,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (height, width) = self.input_shape;
        if height == 0 || width == 0 {
            return Err(SegmentationError::InvalidConfig(format!(
                "input_shape must be non-zero, got {}x{}",
                height, width
            )));
        }

        if !(0.0..=1.0).contains(&self.score_th) {
            return Err(SegmentationError::InvalidConfig(format!(
                "score_th must lie in [0, 1], got {}",
                self.score_th
            )));
        }

        if self.providers.is_empty() {
            return Err(SegmentationError::InvalidConfig(
                "at least one execution provider is required".to_string(),
            ));
        }

        if self.intra_threads == 0 {
            return Err(SegmentationError::InvalidConfig(
                "intra_threads must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
