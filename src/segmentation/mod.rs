mod config;
mod error;
mod onnx;
mod pipeline;
mod preprocess;
pub mod types;

pub use config::{ChannelOrder, ExecutionProviderKind, SegmentationConfig};
pub use error::SegmentationError;
pub use pipeline::RoadSegmentation;

/// Load the ONNX road segmentation pipeline described by `config`
pub fn create_default_pipeline(
    config: &SegmentationConfig,
) -> Result<RoadSegmentation, SegmentationError> {
    RoadSegmentation::from_config(config)
}
