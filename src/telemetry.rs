use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    detect_duration: Histogram<u64>,
    detect_failures: Counter<u64>,
    capture_ticks: Counter<u64>,
    applied_results: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("recycle_vision");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let boundaries = generate_boundaries((50, 100, 200, 1000, 5000));

        let detect_duration = meter
            .u64_histogram("detect_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Round trip of detect requests in milliseconds")
            .build();

        let detect_failures = meter
            .u64_counter("detect_failures_total")
            .with_description("Detect requests that did not produce detections")
            .build();

        let capture_ticks = meter
            .u64_counter("capture_ticks_total")
            .with_description("Capture loop ticks that issued a request")
            .build();

        let applied_results = meter
            .u64_counter("applied_results_total")
            .with_description("Live responses that replaced the overlay")
            .build();

        Ok(Metrics {
            request_counter,
            detect_duration,
            detect_failures,
            capture_ticks,
            applied_results,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_detect_duration(&self, duration_ms: u64, flow: &str) {
        let attributes = vec![KeyValue::new("flow", flow.to_string())];
        self.detect_duration.record(duration_ms, &attributes);
    }

    pub fn record_detect_failure(&self, flow: &str, kind: &str) {
        let attributes = vec![
            KeyValue::new("flow", flow.to_string()),
            KeyValue::new("kind", kind.to_string()),
        ];
        self.detect_failures.add(1, &attributes);
    }

    pub fn record_capture_tick(&self) {
        self.capture_ticks.add(1, &[]);
    }

    pub fn record_applied_result(&self) {
        self.applied_results.add(1, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 1000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
