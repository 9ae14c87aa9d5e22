use crate::config::InferenceConfig;
use crate::errors::InferenceError;
use ndarray::{Array, ArrayD, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

pub trait InferenceBackend: Send {
    fn load_model(config: &InferenceConfig) -> Result<Self, InferenceError>
    where
        Self: Sized;

    /// Run inference on a `[1, 3, H, W]` input tensor
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> Result<InferenceOutput, InferenceError>;

    /// Custom metadata the exporter embedded in the model.
    fn metadata(&self) -> &ModelMetadata;

    /// Execution provider the session runs on, for logs.
    fn provider(&self) -> &str;
}

pub struct InferenceOutput {
    pub predictions: ArrayD<f32>, // [1, 4 + num_classes, num_anchors]
}

#[derive(Debug, Clone, Default)]
pub struct ModelMetadata {
    /// Raw `names` entry, a Python dict literal
    pub names: Option<String>,
    /// Raw `imgsz` entry, e.g. `[640, 640]`
    pub imgsz: Option<String>,
}
