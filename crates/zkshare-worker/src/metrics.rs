//! Prometheus metrics for the executor

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::Arc;

use zkshare_core::Operation;

type Labels = Vec<(String, String)>;

/// Counters and histograms shared by every in-flight request.
///
/// Cloning is cheap: all handles point at the same registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests: Family<Labels, Counter>,
    duration: Family<Labels, Histogram>,
    payload_bytes: Family<Labels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let requests = Family::default();
        let payload_bytes = Family::default();
        let duration: Family<Labels, Histogram> = Family::new_with_constructor(|| {
            Histogram::new([0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
        });

        registry.register(
            "zkshare_requests",
            "Requests processed by the crypto executor",
            requests.clone(),
        );
        registry.register(
            "zkshare_request_duration_seconds",
            "Time spent on cryptographic work per request",
            duration.clone(),
        );
        registry.register(
            "zkshare_payload_bytes",
            "Payload bytes accepted by the crypto executor",
            payload_bytes.clone(),
        );

        Self {
            registry: Arc::new(registry),
            requests,
            duration,
            payload_bytes,
        }
    }

    pub fn record(&self, op: Operation, success: bool, elapsed_secs: f64, bytes: usize) {
        let outcome = if success { "success" } else { "error" };
        self.requests
            .get_or_create(&request_labels(op, outcome))
            .inc();
        self.duration
            .get_or_create(&op_labels(op))
            .observe(elapsed_secs);
        self.payload_bytes
            .get_or_create(&op_labels(op))
            .inc_by(bytes as u64);
    }

    /// Count of requests for `op` with the given outcome ("success" / "error").
    ///
    /// Read-only: an unseen label set reads as zero and is not created.
    pub fn requests_total(&self, op: Operation, outcome: &str) -> u64 {
        self.requests
            .get(&request_labels(op, outcome))
            .map_or(0, |counter| counter.get())
    }

    /// Render the OpenMetrics text exposition.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!("metrics encode failed: {e}");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn op_labels(op: Operation) -> Labels {
    vec![("op".to_string(), op.as_str().to_string())]
}

fn request_labels(op: Operation, outcome: &str) -> Labels {
    vec![
        ("op".to_string(), op.as_str().to_string()),
        ("outcome".to_string(), outcome.to_string()),
    ]
}
