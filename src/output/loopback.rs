use super::{fit_frame, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Virtual camera output through a v4l2loopback device
pub struct V4L2Output {
    // Held so the negotiated format stays in place while we stream
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;

        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        let applied =
            Output::set_format(&device, &format).context("Failed to set YUYV output format")?;
        tracing::debug!(
            "Loopback format: {}x{} {:?}",
            applied.width,
            applied.height,
            applied.fourcc
        );

        // v4l2loopback accepts raw frames written straight to the device node
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            _device: device,
            file,
            width,
            height,
        })
    }
}

/// Pack an RGB frame as YUYV 4:2:2, sharing chroma across horizontal pairs
fn rgb_to_yuyv(frame: &RgbImage) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    let mut yuyv = Vec::with_capacity((width.div_ceil(2) * 4 * height) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let left = frame.get_pixel(x, y);
            let right = if x + 1 < width {
                frame.get_pixel(x + 1, y)
            } else {
                left
            };

            let (y0, u0, v0) = rgb_to_yuv(left[0], left[1], left[2]);
            let (y1, u1, v1) = rgb_to_yuv(right[0], right[1], right[2]);

            yuyv.extend_from_slice(&[
                y0,
                ((u0 as u16 + u1 as u16) / 2) as u8,
                y1,
                ((v0 as u16 + v1 as u16) / 2) as u8,
            ]);
        }
    }

    yuyv
}

/// BT.601 RGB to YUV
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let u = (-0.147 * r - 0.289 * g + 0.436 * b + 128.0).round().clamp(0.0, 255.0) as u8;
    let v = (0.615 * r - 0.515 * g - 0.100 * b + 128.0).round().clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let frame = fit_frame(frame, self.width, self.height);
        let yuyv = rgb_to_yuyv(&frame);

        self.file
            .write_all(&yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
