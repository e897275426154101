//! Prometheus request metrics.
//!
//! Each app owns its own [`Registry`] instead of the process-global one, so
//! several apps (tests) can coexist in one process.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const LABELS: [&str; 3] = ["method", "route", "status"];
const DURATION_BUCKETS: [f64; 7] = [0.05, 0.1, 0.3, 0.5, 1.0, 3.0, 5.0];

pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
    errors: IntCounter,
    duration: HistogramVec,
}

impl HttpMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let up = IntGauge::new("app_up", "Always 1")?;
        up.set(1);

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &LABELS,
        )?;
        let errors = IntCounter::new("http_errors_total", "5xx HTTP responses")?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Request duration (seconds)",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &LABELS,
        )?;

        registry.register(Box::new(up))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            errors,
            duration,
        })
    }

    pub fn observe(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let status_label = status.to_string();
        let labels = [method, route, status_label.as_str()];

        self.requests.with_label_values(&labels).inc();
        self.duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
        if status >= 500 {
            self.errors.inc();
        }
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
