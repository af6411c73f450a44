use super::{fit_frame, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Writes annotated frames as numbered PNG files
pub struct ImageDirOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    written: u64,
}

impl ImageDirOutput {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        tracing::info!("Writing frames to {} ({}x{})", dir.display(), width, height);

        Ok(Self {
            dir,
            width,
            height,
            written: 0,
        })
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }
}

impl OutputSink for ImageDirOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let frame = fit_frame(frame, self.width, self.height);
        let path = self.frame_path(self.written + 1);

        frame
            .save(&path)
            .with_context(|| format!("Failed to write frame {}", path.display()))?;
        self.written += 1;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frames_are_numbered_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = ImageDirOutput::new(dir.path().join("annotated"), 8, 4).unwrap();

        output
            .write_frame(&RgbImage::from_pixel(8, 4, Rgb([0, 0, 255])))
            .unwrap();
        output
            .write_frame(&RgbImage::from_pixel(8, 4, Rgb([255, 0, 0])))
            .unwrap();

        let second = image::open(dir.path().join("annotated/frame_000002.png"))
            .unwrap()
            .into_rgb8();
        assert_eq!(*second.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert!(dir.path().join("annotated/frame_000001.png").exists());
    }

    #[test]
    fn frames_are_resized_to_output_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = ImageDirOutput::new(dir.path(), 10, 6).unwrap();

        output.write_frame(&RgbImage::new(40, 30)).unwrap();

        let dims = image::image_dimensions(dir.path().join("frame_000001.png")).unwrap();
        assert_eq!(dims, (10, 6));
    }
}
