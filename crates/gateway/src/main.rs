use gateway::{
    annotate::Annotator,
    config::get_configuration,
    logging::setup_logging,
    metrics::PredictMetrics,
    server::run_server,
    state::{AppState, load_model_with},
};
use inference::{Detector, OrtBackend, YoloDetector};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    let _telemetry = setup_logging(&config)?;

    tracing::info!(config = ?config, "Loaded configuration");

    tracing::info!("Loading detection model");
    let model = load_model_with(&config.model, |inference_config| {
        let detector = YoloDetector::<OrtBackend>::load(inference_config)?;
        Ok(Arc::new(detector) as Arc<dyn Detector>)
    })?;

    let annotator = Annotator::load(
        config.render.font_path.as_deref(),
        config.render.font_size,
        config.render.line_width,
    )?;

    let request_timeout = match config.server.request_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let state = AppState {
        model,
        annotator: Arc::new(annotator),
        metrics: PredictMetrics::new("gateway"),
        jpeg_quality: config.render.jpeg_quality,
        request_timeout,
    };

    run_server(&config.server, state).await
}
