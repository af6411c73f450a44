use super::config::ChannelOrder;
use super::error::{Result, SegmentationError};
use image::{imageops, DynamicImage, RgbImage};
use ndarray::{Array3, Array4};

/// Borrow the RGB8 raster behind a frame, rejecting anything else
pub fn rgb_frame(frame: &DynamicImage) -> Result<&RgbImage> {
    let rgb = frame.as_rgb8().ok_or_else(|| {
        SegmentationError::InvalidFrame(format!(
            "expected 3-channel 8-bit frame, got {:?}",
            frame.color()
        ))
    })?;

    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(SegmentationError::InvalidFrame(format!(
            "frame has zero area ({}x{})",
            width, height
        )));
    }

    Ok(rgb)
}

/// Preprocessor for converting RGB frames to model input tensors
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    channel_order: ChannelOrder,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, channel_order: ChannelOrder) -> Self {
        Self {
            target_width,
            target_height,
            channel_order,
        }
    }

    /// Preprocess an RGB frame into an NHWC tensor
    ///
    /// The frame is resized with bilinear filtering and samples are cast to
    /// `f32` as-is (0..255); the road model does its own normalization.
    ///
    /// Returns: Array4<f32> with shape [1, height, width, 3]
    pub fn preprocess(&self, frame: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if frame.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                frame,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame
        };

        let channel_order = self.channel_order;
        Array4::from_shape_fn(
            (
                1,
                self.target_height as usize,
                self.target_width as usize,
                3,
            ),
            |(_, y, x, c)| {
                let pixel = source.get_pixel(x as u32, y as u32);
                let c = match channel_order {
                    ChannelOrder::Rgb => c,
                    ChannelOrder::Bgr => 2 - c,
                };
                pixel[c] as f32
            },
        )
    }
}

/// Resample a (height, width, channel) score raster with bilinear interpolation
///
/// Uses pixel-center alignment with edge clamping. Scores are not clamped,
/// which is why this does not go through `imageops` (its float path
/// saturates to [0, 1]).
pub fn resample_scores(scores: &Array3<f32>, target_width: u32, target_height: u32) -> Array3<f32> {
    let (src_height, src_width, channels) = scores.dim();
    let (dst_width, dst_height) = (target_width as usize, target_height as usize);

    if (src_width, src_height) == (dst_width, dst_height) {
        return scores.clone();
    }

    let _span = tracing::debug_span!("resample_scores").entered();

    let xs = sample_positions(src_width, dst_width);
    let ys = sample_positions(src_height, dst_height);

    Array3::from_shape_fn((dst_height, dst_width, channels), |(y, x, c)| {
        let (y0, y1, fy) = ys[y];
        let (x0, x1, fx) = xs[x];

        let top = scores[[y0, x0, c]] * (1.0 - fx) + scores[[y0, x1, c]] * fx;
        let bottom = scores[[y1, x0, c]] * (1.0 - fx) + scores[[y1, x1, c]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// For every destination index: the two neighbouring source indices and the
/// weight of the second one
fn sample_positions(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f32 / dst_len as f32;
    let last = src_len.saturating_sub(1);

    (0..dst_len)
        .map(|i| {
            let pos = ((i as f32 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = if i0 == i1 { 0.0 } else { pos - i0 as f32 };
            (i0, i1, frac)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb};

    #[test]
    fn tensor_has_model_shape_and_raw_values() {
        let frame = RgbImage::from_pixel(64, 32, Rgb([10, 20, 30]));
        let tensor = Preprocessor::new(16, 8, ChannelOrder::Rgb).preprocess(&frame);

        assert_eq!(tensor.dim(), (1, 8, 16, 3));
        assert_eq!(tensor[[0, 3, 5, 0]], 10.0);
        assert_eq!(tensor[[0, 3, 5, 1]], 20.0);
        assert_eq!(tensor[[0, 3, 5, 2]], 30.0);
    }

    #[test]
    fn bgr_order_swaps_red_and_blue() {
        let frame = RgbImage::from_pixel(4, 4, Rgb([200, 100, 50]));
        let tensor = Preprocessor::new(4, 4, ChannelOrder::Bgr).preprocess(&frame);

        assert_eq!(tensor[[0, 0, 0, 0]], 50.0);
        assert_eq!(tensor[[0, 0, 0, 1]], 100.0);
        assert_eq!(tensor[[0, 0, 0, 2]], 200.0);
    }

    #[test]
    fn grayscale_frame_is_rejected() {
        let frame = DynamicImage::ImageLuma8(GrayImage::new(8, 8));
        assert!(matches!(
            rgb_frame(&frame),
            Err(SegmentationError::InvalidFrame(_))
        ));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            rgb_frame(&frame),
            Err(SegmentationError::InvalidFrame(_))
        ));
    }

    #[test]
    fn resample_changes_only_spatial_size() {
        let scores = Array3::from_elem((512, 896, 3), 0.7f32);
        let resized = resample_scores(&scores, 200, 100);

        assert_eq!(resized.dim(), (100, 200, 3));
        assert!(resized.iter().all(|&v| (v - 0.7).abs() < 1e-6));
    }

    #[test]
    fn resample_interpolates_between_neighbours() {
        // 1x2 source: 0.0 then 2.0; upsampling to 4 wide puts samples at
        // -0.25, 0.25, 0.75, 1.25 in source space
        let mut scores = Array3::<f32>::zeros((1, 2, 3));
        scores[[0, 1, 0]] = 2.0;
        let resized = resample_scores(&scores, 4, 1);

        let row: Vec<f32> = (0..4).map(|x| resized[[0, x, 0]]).collect();
        assert_eq!(row, vec![0.0, 0.5, 1.5, 2.0]);
    }

    #[test]
    fn resample_keeps_scores_above_one() {
        let scores = Array3::from_elem((2, 2, 3), 4.5f32);
        let resized = resample_scores(&scores, 5, 3);
        assert!(resized.iter().all(|&v| (v - 4.5).abs() < 1e-5));
    }
}
