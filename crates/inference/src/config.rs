use crate::errors::InferenceError;
use serde::Deserialize;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub model_path: String,
    /// Fallback class names, one per line, used when the model carries no `names` metadata.
    pub labels_path: Option<String>,
    /// Side of the square network input.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub execution_provider: ExecutionProvider,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: "./best.onnx".to_string(),
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            intra_threads: 4,
            execution_provider: ExecutionProvider::Cpu,
        }
    }
}

impl InferenceConfig {
    /// Reject values that would make every request fail or panic.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |msg: String| Err(InferenceError::InvalidConfig(msg));

        if self.input_size == 0 {
            return invalid("input_size must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return invalid(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.max_detections == 0 {
            return invalid("max_detections must be at least 1".to_string());
        }
        Ok(())
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            model_path: "/models/best.onnx".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(InferenceConfig::default().validate().is_ok());
    }

    /// Out-of-range knobs are rejected with the offending field named
    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases = [
            (
                InferenceConfig {
                    input_size: 0,
                    ..InferenceConfig::test_default()
                },
                "input_size",
            ),
            (
                InferenceConfig {
                    confidence_threshold: 1.5,
                    ..InferenceConfig::test_default()
                },
                "confidence_threshold",
            ),
            (
                InferenceConfig {
                    confidence_threshold: f32::NAN,
                    ..InferenceConfig::test_default()
                },
                "confidence_threshold",
            ),
            (
                InferenceConfig {
                    iou_threshold: -0.1,
                    ..InferenceConfig::test_default()
                },
                "iou_threshold",
            ),
            (
                InferenceConfig {
                    max_detections: 0,
                    ..InferenceConfig::test_default()
                },
                "max_detections",
            ),
        ];

        for (config, field) in cases {
            match config.validate() {
                Err(InferenceError::InvalidConfig(msg)) => {
                    assert!(msg.contains(field), "{field}: {msg}")
                }
                other => panic!("{field}: expected InvalidConfig, got {other:?}"),
            }
        }
    }

    /// Threshold bounds themselves are allowed
    #[test]
    fn test_validate_accepts_boundaries() {
        let config = InferenceConfig {
            input_size: 1,
            confidence_threshold: 0.0,
            iou_threshold: 1.0,
            max_detections: 1,
            ..InferenceConfig::test_default()
        };
        assert!(config.validate().is_ok());
    }
}
