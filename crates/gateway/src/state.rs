use crate::annotate::Annotator;
use crate::config::ModelSettings;
use crate::metrics::PredictMetrics;
use inference::{Detector, InferenceConfig, InferenceError};
use std::sync::Arc;
use std::time::Duration;

/// Readiness of the detection model.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<dyn Detector>),
    /// Startup load failed; carries the reason
    Unavailable(Arc<str>),
}

#[derive(Clone)]
pub struct AppState {
    pub model: ModelState,
    pub annotator: Arc<Annotator>,
    pub metrics: PredictMetrics,
    pub jpeg_quality: u8,
    /// `None` disables the per-request timeout
    pub request_timeout: Option<Duration>,
}

/// Run `loader` once and apply the startup policy: propagate the error when the
/// model is required, otherwise start in the unavailable state.
pub fn load_model_with<F>(settings: &ModelSettings, loader: F) -> Result<ModelState, InferenceError>
where
    F: FnOnce(&InferenceConfig) -> Result<Arc<dyn Detector>, InferenceError>,
{
    match loader(&settings.inference_config()) {
        Ok(detector) => Ok(ModelState::Ready(detector)),
        Err(e) if settings.require_on_startup => Err(e),
        Err(e) => {
            tracing::error!(
                error = %e,
                model_path = %settings.path,
                "Model failed to load, serving without it"
            );
            Ok(ModelState::Unavailable(Arc::from(format!(
                "Model is not available: {e}"
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference::ExecutionProvider;

    fn settings(require_on_startup: bool) -> ModelSettings {
        ModelSettings {
            path: "/missing/best.onnx".to_string(),
            labels_path: None,
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.7,
            max_detections: 300,
            intra_threads: 1,
            execution_provider: ExecutionProvider::Cpu,
            require_on_startup,
        }
    }

    fn failing_loader(config: &InferenceConfig) -> Result<Arc<dyn Detector>, InferenceError> {
        Err(InferenceError::ModelNotFound(config.model_path.clone()))
    }

    /// Required model: the load error aborts startup
    #[test]
    fn test_required_model_failure_propagates() {
        let result = load_model_with(&settings(true), failing_loader);
        assert!(matches!(result, Err(InferenceError::ModelNotFound(_))));
    }

    /// Optional model: the server starts in the unavailable state
    #[test]
    fn test_optional_model_failure_is_unavailable() {
        let state = load_model_with(&settings(false), failing_loader).unwrap();
        match state {
            ModelState::Unavailable(reason) => {
                assert!(reason.contains("/missing/best.onnx"), "reason: {reason}")
            }
            ModelState::Ready(_) => panic!("expected unavailable state"),
        }
    }
}
