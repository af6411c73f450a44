mod image_sequence;
mod v4l_capture;

pub use image_sequence::ImageSequence;
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Trait for frame sources
pub trait CaptureSource {
    /// Capture the next frame, or `None` once the stream has ended
    fn capture_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
