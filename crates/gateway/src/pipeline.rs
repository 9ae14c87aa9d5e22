//! Blocking request pipeline: decode, detect, render, encode, summarize.

use crate::annotate::{Annotation, Annotator};
use crate::encode::{EncodeError, encode_jpeg, to_base64};
use inference::{Detection, Detector, InferenceError, LabelMap};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Inference(#[from] InferenceError),
    #[error("{0}")]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub label: String,
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in input image pixels
    pub bounding_box: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub image_with_boxes_base64: String,
    pub detected_food_labels: Vec<String>,
    pub analysis_results: Vec<AnalysisResult>,
    pub overall_average_confidence: f64,
}

/// Everything a prediction needs besides the upload itself.
pub struct Pipeline<'a> {
    pub detector: &'a dyn Detector,
    pub annotator: &'a Annotator,
    pub jpeg_quality: u8,
}

impl Pipeline<'_> {
    pub fn analyze(&self, bytes: &[u8]) -> Result<PredictResponse, PipelineError> {
        let image = {
            let _s = tracing::info_span!("decode_image", bytes = bytes.len()).entered();
            image::load_from_memory(bytes)?.to_rgb8()
        };

        let detections = self.detector.detect(&image)?;
        let labels = self.detector.labels();

        let analysis_results = summarize(&detections, labels);

        let annotations: Vec<Annotation<'_>> = detections
            .iter()
            .zip(&analysis_results)
            .map(|(det, result)| Annotation {
                class_id: det.class_id,
                label: &result.label,
                confidence: det.confidence,
                bbox: det.bbox,
            })
            .collect();

        let annotated = self.annotator.render(image, &annotations);

        let jpeg = {
            let _s = tracing::info_span!("encode_jpeg").entered();
            encode_jpeg(
                annotated.image.as_raw(),
                annotated.image.width(),
                annotated.image.height(),
                annotated.order,
                self.jpeg_quality,
            )?
        };

        let overall_average_confidence = average_confidence(&analysis_results);
        let detected_food_labels = analysis_results.iter().map(|r| r.label.clone()).collect();

        Ok(PredictResponse {
            image_with_boxes_base64: to_base64(&jpeg),
            detected_food_labels,
            analysis_results,
            overall_average_confidence,
        })
    }
}

/// Per-detection fields, in detector order.
pub fn summarize(detections: &[Detection], labels: &dyn LabelMap) -> Vec<AnalysisResult> {
    detections
        .iter()
        .map(|det| AnalysisResult {
            label: labels.resolve(det.class_id),
            confidence: det.confidence as f64,
            bounding_box: det.bbox.map(f64::from),
        })
        .collect()
}

/// Mean confidence, `0.0` for no detections.
pub fn average_confidence(results: &[AnalysisResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
}
