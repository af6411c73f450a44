use super::CaptureSource;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Frame source that replays the images in a directory, ordered by file name
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    next: usize,
    resolution: (u32, u32),
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Reading frames from {}", dir.display());

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                frames.push(path);
            }
        }
        frames.sort();

        let Some(first) = frames.first() else {
            bail!("No image frames found in {}", dir.display());
        };

        let resolution = image::image_dimensions(first)
            .with_context(|| format!("Failed to read frame header {}", first.display()))?;

        tracing::info!(
            "Found {} frames ({}x{})",
            frames.len(),
            resolution.0,
            resolution.1
        );

        Ok(Self {
            frames,
            next: 0,
            resolution,
        })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let frame = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .into_rgb8();

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn replays_frames_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 2, Rgb([2, 2, 2]))
            .save(dir.path().join("frame_002.png"))
            .unwrap();
        RgbImage::from_pixel(4, 2, Rgb([1, 1, 1]))
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(source.resolution(), (4, 2));

        let first = source.capture_frame().unwrap().unwrap();
        assert_eq!(*first.get_pixel(0, 0), Rgb([1, 1, 1]));
        let second = source.capture_frame().unwrap().unwrap();
        assert_eq!(*second.get_pixel(0, 0), Rgb([2, 2, 2]));

        assert!(source.capture_frame().unwrap().is_none());
        assert!(source.capture_frame().unwrap().is_none());
    }

    #[test]
    fn grayscale_files_are_converted_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(3, 3, Luma([90]))
            .save(dir.path().join("gray.png"))
            .unwrap();

        let mut source = ImageSequence::open(dir.path()).unwrap();
        let frame = source.capture_frame().unwrap().unwrap();
        assert_eq!(*frame.get_pixel(1, 1), Rgb([90, 90, 90]));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequence::open(dir.path()).is_err());
    }
}
