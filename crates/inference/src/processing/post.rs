use crate::errors::InferenceError;
use ndarray::{ArrayViewD, Axis, Ix2};
use serde::Serialize;

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// A detection in original image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
        }
    }

    /// Decode a YOLO detection head into detections ordered by descending confidence.
    #[tracing::instrument(skip(self, predictions, transform))]
    pub fn parse_detections(
        &self,
        predictions: &ArrayViewD<f32>, // [1, 4 + num_classes, num_anchors], cxcywh in input pixels
        transform: &TransformParams,
    ) -> Result<Vec<Detection>, InferenceError> {
        let shape = predictions.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(InferenceError::OutputShape(shape));
        }

        let head = predictions
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|_| InferenceError::OutputShape(shape.clone()))?;

        let num_channels = shape[1];
        let num_anchors = shape[2];

        let mut candidates = Vec::new();

        for a in 0..num_anchors {
            // Argmax over class scores
            let mut confidence = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 4..num_channels {
                let score = head[[c, a]];
                if score > confidence {
                    confidence = score;
                    class_id = c - 4;
                }
            }

            // Inclusive bound: a score equal to the threshold is kept
            if confidence < self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) =
                cxcywh_to_xyxy(head[[0, a]], head[[1, a]], head[[2, a]], head[[3, a]]);

            // Inverse letterbox into original image coordinates
            candidates.push(Detection {
                class_id,
                confidence,
                bbox: [
                    (x1 - transform.offset_x) / transform.scale,
                    (y1 - transform.offset_y) / transform.scale,
                    (x2 - transform.offset_x) / transform.scale,
                    (y2 - transform.offset_y) / transform.scale,
                ],
            });
        }

        let total = candidates.len();
        let mut kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        let width = transform.orig_width as f32;
        let height = transform.orig_height as f32;
        for det in &mut kept {
            det.bbox[0] = det.bbox[0].clamp(0.0, width);
            det.bbox[1] = det.bbox[1].clamp(0.0, height);
            det.bbox[2] = det.bbox[2].clamp(0.0, width);
            det.bbox[3] = det.bbox[3].clamp(0.0, height);
        }

        tracing::debug!(candidates = total, kept = kept.len(), "Decoded detections");

        Ok(kept)
    }
}

/// Greedy class-aware NMS. Boxes of different classes never suppress each other.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes
#[inline]
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
