use super::{InferenceBackend, InferenceOutput, ModelMetadata};
use crate::config::{ExecutionProvider, InferenceConfig};
use crate::errors::InferenceError;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::fmt;
use std::path::Path;

pub struct OrtBackend {
    session: Session,
    input_name: String,
    metadata: ModelMetadata,
    provider: ExecutionProvider,
}

fn load_error<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> InferenceError + '_ {
    move |e| InferenceError::ModelLoad(format!("{context}: {e}"))
}

fn runtime_error<E: fmt::Display>(e: E) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}

impl OrtBackend {
    fn read_metadata(session: &Session) -> Result<ModelMetadata, InferenceError> {
        let metadata = session
            .metadata()
            .map_err(load_error("Failed to read model metadata"))?;

        let lookup = |key: &str| match metadata.custom(key) {
            Ok(Some(value)) => Some(value),
            _ => None,
        };

        Ok(ModelMetadata {
            names: lookup("names"),
            imgsz: lookup("imgsz"),
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(config: &InferenceConfig) -> Result<Self, InferenceError> {
        if !Path::new(&config.model_path).exists() {
            return Err(InferenceError::ModelNotFound(config.model_path.clone()));
        }

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()
            .map_err(load_error("Failed to create session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error("Failed to set optimization level"))?
            .with_intra_threads(config.intra_threads)
            .map_err(load_error("Failed to set intra-op threads"))?;

        let builder = match config.execution_provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder
                    .with_execution_providers([CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure()])
                    .map_err(load_error("Failed to register CUDA execution provider"))?
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
                builder
                    .with_execution_providers([CPUExecutionProvider::default().build()])
                    .map_err(load_error("Failed to register CPU execution provider"))?
            }
        };

        let session = builder
            .commit_from_file(&config.model_path)
            .map_err(load_error("Failed to load model"))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());

        let metadata = Self::read_metadata(&session)?;

        tracing::info!(path = %config.model_path, input = %input_name, "Model loaded");

        Ok(Self {
            session,
            input_name,
            metadata,
            provider: config.execution_provider,
        })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> Result<InferenceOutput, InferenceError> {
        let images = images.as_standard_layout();
        let input = TensorRef::from_array_view(&images).map_err(runtime_error)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(runtime_error)?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(runtime_error)?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let predictions = Array::from_shape_vec(IxDyn(&dims), data.to_vec())
            .map_err(|_| InferenceError::OutputShape(dims.clone()))?;

        Ok(InferenceOutput { predictions })
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn provider(&self) -> &str {
        match self.provider {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
        }
    }
}
