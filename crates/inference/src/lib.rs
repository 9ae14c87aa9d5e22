pub mod backend;
pub mod config;
pub mod detector;
pub mod errors;
pub mod labels;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InferenceOutput, ModelMetadata};
#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
pub use config::{ExecutionProvider, InferenceConfig};
pub use detector::{Detector, YoloDetector};
pub use errors::InferenceError;
pub use labels::{ClassNames, LabelMap};
pub use processing::post::Detection;
