use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Request metrics on the global meter. No-ops until an exporter is installed.
#[derive(Clone)]
pub struct PredictMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    failures: Counter<u64>,
    detections: Counter<u64>,
}

impl PredictMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0, 10.0, 30.0,
        ];

        Self {
            duration: meter
                .f64_histogram("predict_duration_seconds")
                .with_description("Time to answer a predict request (decode + detect + render + encode)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            requests: meter
                .u64_counter("predict_requests_total")
                .with_description("Total predict requests")
                .build(),
            failures: meter
                .u64_counter("predict_failures_total")
                .with_description("Predict requests answered with an error")
                .build(),
            detections: meter
                .u64_counter("predict_detections_total")
                .with_description("Total detections returned")
                .build(),
        }
    }

    pub fn record_success(&self, elapsed: Duration, detections: usize) {
        self.requests.add(1, &[]);
        self.detections.add(detections as u64, &[]);
        self.duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", "success")]);
    }

    pub fn record_failure(&self, elapsed: Duration, status: u16) {
        self.requests.add(1, &[]);
        self.failures
            .add(1, &[KeyValue::new("status", i64::from(status))]);
        self.duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", "failure")]);
    }
}
