use super::config::{ExecutionProviderKind, SegmentationConfig};
use super::error::{Result, SegmentationError};
use super::types::SegmentationBackend;
use ndarray::{Array4, ArrayD, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
    ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

/// ONNX Runtime backed segmentation model
///
/// The session is loaded once and shared read-only; ONNX Runtime needs
/// exclusive access to run it, so calls are serialized through a mutex.
pub struct OnnxSegmenter {
    session: Mutex<Session>,
    description: String,
}

impl OnnxSegmenter {
    /// Load the model named by `config.model_path`
    ///
    /// Fails with [`SegmentationError::ModelLoad`] if the file is missing,
    /// if none of the requested execution providers is available, or if
    /// ONNX Runtime rejects the artifact.
    pub fn load(config: &SegmentationConfig) -> Result<Self> {
        let path = config.model_path.as_path();

        if !path.is_file() {
            return Err(SegmentationError::model_load(path, "no such file"));
        }

        tracing::info!("Loading segmentation model from {}", path.display());

        let providers = available_providers(&config.providers);
        if providers.is_empty() {
            return Err(SegmentationError::model_load(
                path,
                format!("none of the requested providers {:?} is available", config.providers),
            ));
        }
        let (provider_names, providers): (Vec<_>, Vec<_>) = providers.into_iter().unzip();
        tracing::info!("Execution providers: {:?}", provider_names);

        let session = Session::builder()
            .map_err(load_error(path))?
            .with_execution_providers(providers)
            .map_err(load_error(path))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error(path))?
            .with_intra_threads(config.intra_threads)
            .map_err(load_error(path))?
            .commit_from_file(path)
            .map_err(load_error(path))?;

        let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        tracing::info!("Model loaded: inputs={:?}, outputs={:?}", inputs, outputs);

        if session.inputs.is_empty() || session.outputs.is_empty() {
            return Err(SegmentationError::model_load(
                path,
                "model must declare at least one input and one output",
            ));
        }

        let description = format!("onnx:{}", path.display());

        Ok(Self {
            session: Mutex::new(session),
            description,
        })
    }
}

fn load_error<E: std::fmt::Display>(path: &Path) -> impl FnOnce(E) -> SegmentationError + '_ {
    move |e| SegmentationError::model_load(path, e)
}

/// Requested providers that the linked ONNX Runtime can actually use,
/// in preference order
fn available_providers(
    requested: &[ExecutionProviderKind],
) -> Vec<(ExecutionProviderKind, ExecutionProviderDispatch)> {
    let mut providers = Vec::new();

    for &kind in requested {
        if providers.iter().any(|(seen, _)| *seen == kind) {
            continue;
        }

        let available = match kind {
            ExecutionProviderKind::Cpu => CPUExecutionProvider::default().is_available(),
            ExecutionProviderKind::Cuda => CUDAExecutionProvider::default().is_available(),
            ExecutionProviderKind::Tensorrt => TensorRTExecutionProvider::default().is_available(),
        };

        match available {
            Ok(true) => {
                let dispatch = match kind {
                    ExecutionProviderKind::Cpu => CPUExecutionProvider::default().build(),
                    ExecutionProviderKind::Cuda => CUDAExecutionProvider::default().build(),
                    ExecutionProviderKind::Tensorrt => TensorRTExecutionProvider::default().build(),
                };
                providers.push((kind, dispatch));
            }
            Ok(false) => tracing::warn!("Execution provider {:?} is not available", kind),
            Err(e) => tracing::warn!("Could not query execution provider {:?}: {}", kind, e),
        }
    }

    providers
}

impl SegmentationBackend for OnnxSegmenter {
    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let _span = tracing::debug_span!("inference").entered();

        let tensor = Tensor::from_array(input)
            .map_err(|e| SegmentationError::ModelInference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SegmentationError::ModelInference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| SegmentationError::ModelInference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentationError::ModelInference(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        tracing::debug!("Model output shape: {:?}", dims);

        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(|_| {
            SegmentationError::ShapeMismatch {
                expected: "output data matching its declared shape",
                actual: dims.clone(),
            }
        })
    }

    fn name(&self) -> &str {
        &self.description
    }
}
