use super::config::SegmentationConfig;
use super::error::Result;
use super::onnx::OnnxSegmenter;
use super::preprocess::{resample_scores, rgb_frame, Preprocessor};
use super::types::{SegmentClass, SegmentationBackend, SegmentationMap};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;

/// Opacity of each class overlay pass
const OVERLAY_ALPHA: f32 = 0.5;

/// Road segmentation: model inference plus color-coded mask overlay
///
/// Cloning is cheap and shares the underlying model handle.
pub struct RoadSegmentation<B: SegmentationBackend = OnnxSegmenter> {
    backend: Arc<B>,
    preprocessor: Preprocessor,
    input_width: u32,
    input_height: u32,
    score_th: f32,
}

impl RoadSegmentation<OnnxSegmenter> {
    /// Validate `config` and load its ONNX model
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        config.validate()?;
        let backend = OnnxSegmenter::load(config)?;
        Self::with_backend(Arc::new(backend), config)
    }
}

impl<B: SegmentationBackend> RoadSegmentation<B> {
    pub fn with_backend(backend: Arc<B>, config: &SegmentationConfig) -> Result<Self> {
        config.validate()?;

        let (input_height, input_width) = config.input_shape;
        tracing::debug!(
            "Road segmentation on {}: input {}x{}, score_th={}",
            backend.name(),
            input_width,
            input_height,
            config.score_th
        );

        Ok(Self {
            backend,
            preprocessor: Preprocessor::new(input_width, input_height, config.channel_order),
            input_width,
            input_height,
            score_th: config.score_th,
        })
    }

    /// Run the model on `frame` and return class scores at frame resolution
    pub fn infer(&self, frame: &DynamicImage) -> Result<SegmentationMap> {
        let _span = tracing::debug_span!("infer").entered();

        let rgb = rgb_frame(frame)?;
        let (width, height) = rgb.dimensions();

        let input = self.preprocessor.preprocess(rgb);
        let output = self.backend.forward(input)?;
        let map = SegmentationMap::from_model_output(output)?;

        let _post = tracing::debug_span!("postprocess").entered();
        SegmentationMap::new(resample_scores(map.scores(), width, height))
    }

    /// Overlay the classes in `map` onto a copy of `frame`
    ///
    /// A pixel belongs to a class when its score is strictly greater than
    /// the threshold. Classes are drawn in index order at 0.5 opacity, each
    /// pass blending onto the previous result, so later classes dominate
    /// where masks overlap. Pixels claimed by no class come back unchanged.
    pub fn render(&self, frame: &DynamicImage, map: &SegmentationMap) -> Result<RgbImage> {
        let _span = tracing::debug_span!("render").entered();

        let rgb = rgb_frame(frame)?;
        let (width, height) = rgb.dimensions();

        let resized = SegmentationMap::new(resample_scores(map.scores(), width, height))?;

        let mut output = rgb.clone();
        for class in SegmentClass::FOREGROUND {
            let Some(scores) = resized.class_scores(class) else {
                continue;
            };
            let color = class.color();

            for (x, y, pixel) in output.enumerate_pixels_mut() {
                if scores[[y as usize, x as usize]] > self.score_th {
                    *pixel = blend(*pixel, color, OVERLAY_ALPHA);
                }
            }
        }

        Ok(output)
    }

    /// Model input resolution as (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_th
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: SegmentationBackend> Clone for RoadSegmentation<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            preprocessor: self.preprocessor.clone(),
            input_width: self.input_width,
            input_height: self.input_height,
            score_th: self.score_th,
        }
    }
}

/// `base * (1 - alpha) + overlay * alpha`, rounded and saturated per channel
fn blend(base: Rgb<u8>, overlay: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |a: u8, b: u8| {
        (a as f32 * (1.0 - alpha) + b as f32 * alpha)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgb([
        mix(base[0], overlay[0]),
        mix(base[1], overlay[1]),
        mix(base[2], overlay[2]),
    ])
}
