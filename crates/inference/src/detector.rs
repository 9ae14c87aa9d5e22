use crate::{
    backend::InferenceBackend,
    config::InferenceConfig,
    errors::InferenceError,
    labels::{ClassNames, LabelMap, parse_imgsz},
    processing::{
        post::{Detection, PostProcessor},
        pre::PreProcessor,
    },
};
use common::span;
use image::RgbImage;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Object detector shared by all request handlers.
pub trait Detector: Send + Sync {
    /// Detections in original image coordinates, by descending confidence.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, InferenceError>;

    fn labels(&self) -> &dyn LabelMap;
}

/// YOLO detector over any [`InferenceBackend`].
///
/// The backend needs exclusive access per run, so it sits behind a mutex.
/// Pre and postprocessing happen outside the lock. A panicked run leaves the
/// session usable, so a poisoned lock is recovered rather than reported.
pub struct YoloDetector<B: InferenceBackend> {
    backend: Mutex<B>,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
    names: ClassNames,
}

impl<B: InferenceBackend> YoloDetector<B> {
    /// Load the backend and resolve class names from model metadata,
    /// falling back to `labels_path`.
    pub fn load(config: &InferenceConfig) -> Result<Self, InferenceError> {
        config.validate()?;

        let backend = B::load_model(config)?;
        let names = resolve_names(&backend, config)?;

        if let Some((h, w)) = backend.metadata().imgsz.as_deref().and_then(parse_imgsz) {
            if h != config.input_size || w != config.input_size {
                tracing::warn!(
                    exported_height = h,
                    exported_width = w,
                    input_size = config.input_size,
                    "Configured input size differs from the exported model size"
                );
            }
        }

        tracing::info!(
            model_path = %config.model_path,
            provider = backend.provider(),
            classes = names.len(),
            input_size = config.input_size,
            "Detector ready"
        );

        Ok(Self::new(backend, names, config))
    }

    pub fn new(backend: B, names: ClassNames, config: &InferenceConfig) -> Self {
        Self {
            backend: Mutex::new(backend),
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(
                config.confidence_threshold,
                config.iou_threshold,
                config.max_detections,
            ),
            names,
        }
    }
}

fn resolve_names<B: InferenceBackend>(
    backend: &B,
    config: &InferenceConfig,
) -> Result<ClassNames, InferenceError> {
    if let Some(raw) = backend.metadata().names.as_deref() {
        match ClassNames::parse_metadata(raw) {
            Ok(names) if !names.is_empty() => return Ok(names),
            Ok(_) => tracing::warn!("Model `names` metadata is empty"),
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable `names` metadata"),
        }
    }

    match &config.labels_path {
        Some(path) => {
            let names = ClassNames::from_file(path)?;
            tracing::info!(labels_path = %path, classes = names.len(), "Loaded class names from file");
            Ok(names)
        }
        None => Err(InferenceError::MissingLabels),
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, InferenceError> {
        let start = Instant::now();

        let prepared = self.preprocessor.preprocess(image)?;

        let output = {
            let _s = span!("model_inference");
            let mut backend = self.backend.lock().unwrap_or_else(|poisoned| {
                tracing::warn!("Recovering model lock after a panicked inference call");
                self.backend.clear_poison();
                PoisonError::into_inner(poisoned)
            });
            backend.infer(&prepared.input)?
        };

        let detections = {
            let _s = span!("postprocess");
            self.postprocessor
                .parse_detections(&output.predictions.view(), &prepared.transform)?
        };

        tracing::debug!(
            detections = detections.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Detection complete"
        );

        Ok(detections)
    }

    fn labels(&self) -> &dyn LabelMap {
        &self.names
    }
}
