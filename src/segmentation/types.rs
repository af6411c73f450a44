use super::error::{Result, SegmentationError};
use image::Rgb;
use ndarray::{Array3, Array4, ArrayD, ArrayView2, Axis};

/// Number of foreground classes the road model scores per pixel
pub const FOREGROUND_CLASSES: usize = 3;

/// Semantic classes of the road model
///
/// Background is never emitted by the model; it is whatever no foreground
/// channel claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentClass {
    Background = 0,
    Road = 1,
    Curb = 2,
    Mark = 3,
}

impl SegmentClass {
    /// Foreground classes in drawing order
    pub const FOREGROUND: [SegmentClass; FOREGROUND_CLASSES] =
        [SegmentClass::Road, SegmentClass::Curb, SegmentClass::Mark];

    /// Index of this class's channel in a [`SegmentationMap`]
    pub fn channel(self) -> Option<usize> {
        match self {
            SegmentClass::Background => None,
            class => Some(class as usize - 1),
        }
    }

    pub fn color(self) -> Rgb<u8> {
        CLASS_COLORS[self as usize]
    }
}

/// Fill color per class index: background, road, curb, mark
pub const CLASS_COLORS: [Rgb<u8>; FOREGROUND_CLASSES + 1] = [
    Rgb([0, 0, 0]),
    Rgb([0, 0, 255]),
    Rgb([0, 255, 0]),
    Rgb([255, 0, 0]),
];

/// Per-pixel class scores, laid out as (height, width, class)
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMap {
    scores: Array3<f32>,
}

impl SegmentationMap {
    /// Wrap a score raster; it must be non-empty and carry exactly one
    /// channel per foreground class
    pub fn new(scores: Array3<f32>) -> Result<Self> {
        let (height, width, channels) = scores.dim();
        if height == 0 || width == 0 || channels != FOREGROUND_CLASSES {
            return Err(SegmentationError::ShapeMismatch {
                expected: "non-empty [height, width, 3]",
                actual: scores.shape().to_vec(),
            });
        }
        Ok(Self { scores })
    }

    /// Strip the batch axis off a `[1, h, w, 3]` model output
    pub fn from_model_output(output: ArrayD<f32>) -> Result<Self> {
        let shape = output.shape().to_vec();
        let batched = output
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|_| SegmentationError::ShapeMismatch {
                expected: "[1, height, width, 3]",
                actual: shape.clone(),
            })?;

        if batched.dim().0 != 1 || batched.dim().3 != FOREGROUND_CLASSES {
            return Err(SegmentationError::ShapeMismatch {
                expected: "[1, height, width, 3]",
                actual: shape,
            });
        }

        Self::new(batched.index_axis_move(Axis(0), 0))
    }

    /// Map filled with a single score
    #[cfg(test)]
    pub fn filled(width: u32, height: u32, score: f32) -> Self {
        Self {
            scores: Array3::from_elem(
                (height as usize, width as usize, FOREGROUND_CLASSES),
                score,
            ),
        }
    }

    pub fn width(&self) -> u32 {
        self.scores.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.scores.dim().0 as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Scores for one foreground class
    pub fn class_scores(&self, class: SegmentClass) -> Option<ArrayView2<'_, f32>> {
        class
            .channel()
            .map(|channel| self.scores.index_axis(Axis(2), channel))
    }

    pub fn scores(&self) -> &Array3<f32> {
        &self.scores
    }
}

/// Trait for model runtimes the pipeline can drive
///
/// Implementations hold read-only weights and must tolerate calls from
/// several threads; any locking the runtime needs happens inside `forward`.
pub trait SegmentationBackend: Send + Sync {
    /// Run one NHWC batch through the model and return its first output
    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Short human-readable description for logs
    fn name(&self) -> &str;
}
