mod capture;
mod output;
mod segmentation;

use anyhow::{Context, Result};
use capture::{CaptureSource, ImageSequence, WebcamCapture};
use clap::Parser;
use image::DynamicImage;
use output::{ImageDirOutput, OutputSink, V4L2Output};
use segmentation::types::SegmentationBackend;
use segmentation::{ChannelOrder, ExecutionProviderKind, RoadSegmentation, SegmentationConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Frames between timing reports
const STATS_INTERVAL: u64 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about = "Road segmentation overlay for video frames", long_about = None)]
struct Args {
    /// Path to the road segmentation model (ONNX file)
    #[arg(short, long)]
    model: PathBuf,

    /// Model input height
    #[arg(long, default_value_t = 512)]
    input_height: u32,

    /// Model input width
    #[arg(long, default_value_t = 896)]
    input_width: u32,

    /// Score above which a pixel is drawn as a class
    #[arg(long, default_value_t = 0.5)]
    score_th: f32,

    /// Execution providers in order of preference (repeatable)
    #[arg(long = "provider", value_enum, default_values_t = [ExecutionProviderKind::Cpu])]
    providers: Vec<ExecutionProviderKind>,

    /// Channel order of the model input tensor
    #[arg(long, value_enum, default_value_t = ChannelOrder::Bgr)]
    channel_order: ChannelOrder,

    /// Intra-op threads for ONNX Runtime
    #[arg(long, default_value_t = 4)]
    intra_threads: usize,

    /// Read frames from a directory of images instead of a webcam
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output v4l2loopback device path
    #[arg(short, long)]
    output_device: Option<PathBuf>,

    /// Write annotated frames as PNG files into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width (defaults to the capture width)
    #[arg(long)]
    output_width: Option<u32>,

    /// Output resolution height (defaults to the capture height)
    #[arg(long)]
    output_height: Option<u32>,

    /// Target frames per second, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn segmentation_config(&self) -> SegmentationConfig {
        let mut config = SegmentationConfig::new(&self.model);
        config.input_shape = (self.input_height, self.input_width);
        config.score_th = self.score_th;
        config.providers = self.providers.clone();
        config.channel_order = self.channel_order;
        config.intra_threads = self.intra_threads;
        config
    }
}

/// Loop controls that are not part of the pipeline itself
struct LoopSettings {
    target_fps: u32,
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("roadseg starting");

    let config = args.segmentation_config();
    tracing::info!("Execution provider preference: {:?}", config.providers);

    // Load the model before touching any device
    let pipeline = segmentation::create_default_pipeline(&config)
        .context("Failed to load segmentation model")?;
    let (input_width, input_height) = pipeline.input_size();
    tracing::info!(
        "Segmentation model loaded ({}): input {}x{}, score_th={}",
        pipeline.backend().name(),
        input_width,
        input_height,
        pipeline.score_threshold()
    );

    let mut capture: Box<dyn CaptureSource> = match &args.input_dir {
        Some(dir) => Box::new(ImageSequence::open(dir).context("Failed to open frame directory")?),
        None => Box::new(
            WebcamCapture::new(args.input_device, args.capture_width, args.capture_height)
                .context("Failed to initialize webcam capture")?,
        ),
    };

    let (source_width, source_height) = capture.resolution();
    let output_width = args.output_width.unwrap_or(source_width);
    let output_height = args.output_height.unwrap_or(source_height);
    tracing::info!("Capture: {}x{}", source_width, source_height);
    tracing::info!("Output: {}x{}", output_width, output_height);

    let mut outputs: Vec<Box<dyn OutputSink>> = Vec::new();
    if let Some(device) = &args.output_device {
        outputs.push(Box::new(
            V4L2Output::new(device, output_width, output_height)
                .context("Failed to initialize v4l2loopback output")?,
        ));
    }
    if let Some(dir) = &args.output_dir {
        outputs.push(Box::new(
            ImageDirOutput::new(dir, output_width, output_height)
                .context("Failed to initialize image output")?,
        ));
    }
    if outputs.is_empty() {
        tracing::warn!("No output configured; annotated frames will be discarded");
    }
    for output in &outputs {
        let (width, height) = output.resolution();
        tracing::debug!("Output sink ready at {}x{}", width, height);
    }

    let settings = LoopSettings {
        target_fps: args.fps,
        max_frames: args.max_frames,
    };

    let frames = run_pipeline(capture.as_mut(), &mut outputs, &pipeline, &settings)?;
    tracing::info!("Processed {} frames", frames);

    Ok(())
}

/// Drive frames through the pipeline until the source ends or the frame
/// limit is hit; returns the number of frames processed
fn run_pipeline<B: SegmentationBackend>(
    capture: &mut dyn CaptureSource,
    outputs: &mut [Box<dyn OutputSink>],
    pipeline: &RoadSegmentation<B>,
    settings: &LoopSettings,
) -> Result<u64> {
    let frame_duration = (settings.target_fps > 0)
        .then(|| Duration::from_secs_f32(1.0 / settings.target_fps as f32));
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_render_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");

    loop {
        if settings.max_frames.is_some_and(|max| frame_count >= max) {
            tracing::info!("Reached frame limit");
            break;
        }

        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let Some(frame) = capture
            .capture_frame()
            .context("Failed to capture frame")?
        else {
            tracing::info!("End of stream");
            break;
        };
        total_capture_time += capture_start.elapsed();
        let frame = DynamicImage::ImageRgb8(frame);

        // Segmentation
        let segment_start = Instant::now();
        let map = pipeline.infer(&frame).context("Failed to segment frame")?;
        total_segment_time += segment_start.elapsed();
        let (map_width, map_height) = map.dimensions();
        tracing::trace!("Segmentation map {}x{}", map_width, map_height);

        let render_start = Instant::now();
        let annotated = pipeline
            .render(&frame, &map)
            .context("Failed to render overlay")?;
        total_render_time += render_start.elapsed();

        // Output frame
        let output_start = Instant::now();
        for output in outputs.iter_mut() {
            output
                .write_frame(&annotated)
                .context("Failed to write frame")?;
        }
        total_output_time += output_start.elapsed();

        frame_count += 1;

        if frame_count % STATS_INTERVAL == 0 {
            let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_capture_ms = avg_ms(total_capture_time);
            let avg_segment_ms = avg_ms(total_segment_time);
            let avg_render_ms = avg_ms(total_render_time);
            let avg_output_ms = avg_ms(total_output_time);
            let total_ms = avg_capture_ms + avg_segment_ms + avg_render_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, render={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_render_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    Ok(frame_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::{Array4, ArrayD, IxDyn};
    use crate::segmentation::SegmentationError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct VecSource {
        frames: VecDeque<RgbImage>,
    }

    impl CaptureSource for VecSource {
        fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.frames.pop_front())
        }

        fn resolution(&self) -> (u32, u32) {
            (16, 8)
        }
    }

    #[derive(Clone, Default)]
    struct CollectingSink {
        frames: Arc<Mutex<Vec<RgbImage>>>,
    }

    impl OutputSink for CollectingSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn resolution(&self) -> (u32, u32) {
            (16, 8)
        }
    }

    /// Claims every pixel for every class
    struct SaturatedBackend;

    impl SegmentationBackend for SaturatedBackend {
        fn forward(&self, input: Array4<f32>) -> std::result::Result<ArrayD<f32>, SegmentationError> {
            let (_, height, width, _) = input.dim();
            Ok(ArrayD::from_elem(IxDyn(&[1, height, width, 3]), 1.0))
        }

        fn name(&self) -> &str {
            "saturated"
        }
    }

    struct BrokenBackend;

    impl SegmentationBackend for BrokenBackend {
        fn forward(&self, _input: Array4<f32>) -> std::result::Result<ArrayD<f32>, SegmentationError> {
            Err(SegmentationError::ModelInference("no session".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn source(count: usize) -> VecSource {
        VecSource {
            frames: (0..count).map(|_| RgbImage::new(16, 8)).collect(),
        }
    }

    fn pipeline<B: SegmentationBackend>(backend: B) -> RoadSegmentation<B> {
        let mut config = SegmentationConfig::new("unused.onnx");
        config.input_shape = (8, 16);
        RoadSegmentation::with_backend(Arc::new(backend), &config).unwrap()
    }

    fn unlimited() -> LoopSettings {
        LoopSettings {
            target_fps: 0,
            max_frames: None,
        }
    }

    #[test]
    fn loop_runs_until_end_of_stream() {
        let sink = CollectingSink::default();
        let mut outputs: Vec<Box<dyn OutputSink>> = vec![Box::new(sink.clone())];

        let frames = run_pipeline(
            &mut source(3),
            &mut outputs,
            &pipeline(SaturatedBackend),
            &unlimited(),
        )
        .unwrap();

        assert_eq!(frames, 3);
        let written = sink.frames.lock().unwrap();
        assert_eq!(written.len(), 3);
        assert!(written
            .iter()
            .all(|frame| frame.pixels().all(|p| *p == Rgb([128, 64, 32]))));
    }

    #[test]
    fn loop_stops_at_frame_limit() {
        let sink = CollectingSink::default();
        let mut outputs: Vec<Box<dyn OutputSink>> = vec![Box::new(sink.clone())];
        let settings = LoopSettings {
            target_fps: 0,
            max_frames: Some(2),
        };

        let frames = run_pipeline(
            &mut source(5),
            &mut outputs,
            &pipeline(SaturatedBackend),
            &settings,
        )
        .unwrap();

        assert_eq!(frames, 2);
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn inference_failure_ends_the_loop() {
        let sink = CollectingSink::default();
        let mut outputs: Vec<Box<dyn OutputSink>> = vec![Box::new(sink.clone())];

        let result = run_pipeline(
            &mut source(3),
            &mut outputs,
            &pipeline(BrokenBackend),
            &unlimited(),
        );

        assert!(result.is_err());
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn cli_defaults_match_pipeline_defaults() {
        let args = Args::parse_from(["roadseg", "--model", "model/road_segmentation.onnx"]);
        let config = args.segmentation_config();

        assert_eq!(config.input_shape, (512, 896));
        assert_eq!(config.score_th, 0.5);
        assert_eq!(config.providers, vec![ExecutionProviderKind::Cpu]);
        assert_eq!(config.channel_order, ChannelOrder::Bgr);
    }

    #[test]
    fn providers_keep_command_line_order() {
        let args = Args::parse_from([
            "roadseg",
            "--model",
            "m.onnx",
            "--provider",
            "tensorrt",
            "--provider",
            "cuda",
            "--provider",
            "cpu",
        ]);

        assert_eq!(
            args.providers,
            vec![
                ExecutionProviderKind::Tensorrt,
                ExecutionProviderKind::Cuda,
                ExecutionProviderKind::Cpu
            ]
        );
    }
}
