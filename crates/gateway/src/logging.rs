use crate::config::Config;
use common::TelemetryGuard;

/// Install the tracing subscriber, exporting through OTLP when an endpoint is
/// configured. Keep the returned guard alive for the lifetime of the process.
pub fn setup_logging(config: &Config) -> anyhow::Result<Option<TelemetryGuard>> {
    match config.telemetry.otel_endpoint.as_deref() {
        Some(endpoint) => {
            let guard =
                TelemetryGuard::init("gateway", endpoint, config.log_level, config.environment)?;
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(config.log_level, config.environment);
            Ok(None)
        }
    }
}
