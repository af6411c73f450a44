mod image_dir;
mod loopback;

pub use image_dir::ImageDirOutput;
pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbImage;

/// Trait for annotated-frame destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Resize `frame` to `(width, height)` unless it already matches
fn fit_frame(frame: &RgbImage, width: u32, height: u32) -> std::borrow::Cow<'_, RgbImage> {
    if frame.dimensions() == (width, height) {
        std::borrow::Cow::Borrowed(frame)
    } else {
        std::borrow::Cow::Owned(image::imageops::resize(
            frame,
            width,
            height,
            image::imageops::FilterType::Triangle,
        ))
    }
}
