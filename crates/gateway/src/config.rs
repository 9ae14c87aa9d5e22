use common::{Environment, LogLevel};
use inference::{ExecutionProvider, InferenceConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub render: RenderSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// `0` disables the per-request processing timeout
    pub request_timeout_secs: u64,
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub path: String,
    pub labels_path: Option<String>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub execution_provider: ExecutionProvider,
    /// Abort startup when the model cannot be loaded, instead of serving 503s
    pub require_on_startup: bool,
}

impl ModelSettings {
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            model_path: self.path.clone(),
            labels_path: self.labels_path.clone(),
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
            intra_threads: self.intra_threads,
            execution_provider: self.execution_provider,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSettings {
    pub line_width: u32,
    pub font_size: f32,
    pub font_path: Option<String>,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySettings {
    pub otel_endpoint: Option<String>,
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    get_configuration_from(
        config::Environment::with_prefix("GATEWAY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
        std::env::var("MODEL_PATH").ok(),
    )
}

/// Build the configuration from defaults, an environment source and an
/// optional plain `MODEL_PATH` override.
pub fn get_configuration_from(
    environment: config::Environment,
    model_path: Option<String>,
) -> Result<Config, config::ConfigError> {
    let defaults = InferenceConfig::default();

    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000_i64)?
        .set_default("server.max_upload_bytes", 50_i64 * 1024 * 1024)?
        .set_default("server.request_timeout_secs", 120_i64)?
        .set_default("model.path", defaults.model_path)?
        .set_default("model.input_size", defaults.input_size as i64)?
        .set_default("model.confidence_threshold", defaults.confidence_threshold as f64)?
        .set_default("model.iou_threshold", defaults.iou_threshold as f64)?
        .set_default("model.max_detections", defaults.max_detections as i64)?
        .set_default("model.intra_threads", defaults.intra_threads as i64)?
        .set_default("model.execution_provider", "cpu")?
        .set_default("model.require_on_startup", true)?
        .set_default("render.line_width", 2_i64)?
        .set_default("render.font_size", 20.0_f64)?
        .set_default("render.jpeg_quality", 95_i64)?
        .add_source(environment)
        .set_override_option("model.path", model_path)?
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    config
        .model
        .inference_config()
        .validate()
        .map_err(|e| config::ConfigError::Message(e.to_string()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)], model_path: Option<&str>) -> Config {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let environment = config::Environment::with_prefix("GATEWAY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(source));
        get_configuration_from(environment, model_path.map(str::to_owned)).unwrap()
    }

    /// Every key has a default
    #[test]
    fn test_defaults() {
        let config = from_vars(&[], None);

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.address(), "0.0.0.0:8000");
        assert_eq!(config.server.max_upload_bytes, 52_428_800);
        assert_eq!(config.server.request_timeout_secs, 120);
        assert_eq!(config.model.path, "./best.onnx");
        assert_eq!(config.model.labels_path, None);
        assert_eq!(config.model.input_size, 640);
        assert!((config.model.confidence_threshold - 0.5).abs() < 1e-6);
        assert!((config.model.iou_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.model.max_detections, 300);
        assert_eq!(config.model.execution_provider, ExecutionProvider::Cpu);
        assert!(config.model.require_on_startup);
        assert_eq!(config.render.line_width, 2);
        assert_eq!(config.render.jpeg_quality, 95);
        assert_eq!(config.render.font_path, None);
        assert_eq!(config.telemetry.otel_endpoint, None);
    }

    /// Nested keys are read from prefixed environment variables
    #[test]
    fn test_environment_overrides() {
        let config = from_vars(
            &[
                ("GATEWAY_LOG_LEVEL", "debug"),
                ("GATEWAY_ENVIRONMENT", "production"),
                ("GATEWAY_SERVER__PORT", "9001"),
                ("GATEWAY_MODEL__CONFIDENCE_THRESHOLD", "0.25"),
                ("GATEWAY_MODEL__EXECUTION_PROVIDER", "cuda"),
                ("GATEWAY_MODEL__REQUIRE_ON_STARTUP", "false"),
                ("GATEWAY_TELEMETRY__OTEL_ENDPOINT", "http://localhost:4317"),
            ],
            None,
        );

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 9001);
        assert!((config.model.confidence_threshold - 0.25).abs() < 1e-6);
        assert_eq!(config.model.execution_provider, ExecutionProvider::Cuda);
        assert!(!config.model.require_on_startup);
        assert_eq!(
            config.telemetry.otel_endpoint.as_deref(),
            Some("http://localhost:4317")
        );
    }

    /// A plain MODEL_PATH wins over the prefixed key
    #[test]
    fn test_model_path_override() {
        let config = from_vars(
            &[("GATEWAY_MODEL__PATH", "/prefixed/best.onnx")],
            Some("/models/kfood.onnx"),
        );
        assert_eq!(config.model.path, "/models/kfood.onnx");

        let inference = config.model.inference_config();
        assert_eq!(inference.model_path, "/models/kfood.onnx");
        assert_eq!(inference.input_size, 640);
    }

    /// Model knobs that would break every request are rejected at load time
    #[test]
    fn test_invalid_model_settings_are_rejected() {
        for (key, value) in [
            ("GATEWAY_MODEL__INPUT_SIZE", "0"),
            ("GATEWAY_MODEL__CONFIDENCE_THRESHOLD", "1.5"),
            ("GATEWAY_MODEL__IOU_THRESHOLD", "-0.2"),
            ("GATEWAY_MODEL__MAX_DETECTIONS", "0"),
        ] {
            let source = HashMap::from([(key.to_string(), value.to_string())]);
            let environment = config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(source));

            let err = get_configuration_from(environment, None).unwrap_err();
            assert!(
                err.to_string().contains("Invalid inference configuration"),
                "{key}={value}: {err}"
            );
        }
    }

    /// Unknown enum values are rejected
    #[test]
    fn test_invalid_environment_is_rejected() {
        let source = HashMap::from([(
            "GATEWAY_ENVIRONMENT".to_string(),
            "staging".to_string(),
        )]);
        let environment = config::Environment::with_prefix("GATEWAY")
            .prefix_separator("_")
            .separator("__")
            .source(Some(source));
        assert!(get_configuration_from(environment, None).is_err());
    }
}
