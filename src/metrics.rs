//! Prometheus metrics for the gateway, exported at `GET /metrics` in
//! OpenMetrics text format.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::Mutex;

/// Labels for request counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// Terminal outcome: "completed", "denied", "blocked", "failed"
    pub outcome: String,
}

/// Labels for redaction counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RedactionLabels {
    /// PII label ("EMAIL", "PHONE", ...)
    pub label: String,
}

/// Model call latency buckets in milliseconds.
const MODEL_LATENCY_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 15000.0, 60000.0,
];

/// All gateway metrics plus the registry that encodes them.
pub struct GatewayMetrics {
    registry: Mutex<Registry>,
    /// Mediated requests by terminal outcome
    pub requests_total: Family<OutcomeLabels, Counter>,
    /// Redactions applied, by PII label
    pub redactions_total: Family<RedactionLabels, Counter>,
    /// Documents rejected at ingestion screening
    pub documents_rejected_total: Counter,
    /// Model call latency in milliseconds
    pub model_latency_ms: Histogram,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("wardgate");

        let requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "requests",
            "Mediated requests by terminal outcome",
            requests_total.clone(),
        );

        let redactions_total = Family::<RedactionLabels, Counter>::default();
        registry.register(
            "redactions",
            "Redactions applied by PII label",
            redactions_total.clone(),
        );

        let documents_rejected_total = Counter::default();
        registry.register(
            "documents_rejected",
            "Documents rejected at ingestion screening",
            documents_rejected_total.clone(),
        );

        let model_latency_ms =
            Histogram::new(MODEL_LATENCY_BUCKETS.iter().copied());
        registry.register(
            "model_latency_ms",
            "Model call latency in milliseconds",
            model_latency_ms.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            requests_total,
            redactions_total,
            documents_rejected_total,
            model_latency_ms,
        }
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_redaction(&self, label: &str) {
        self.redactions_total
            .get_or_create(&RedactionLabels {
                label: label.to_string(),
            })
            .inc();
    }

    pub fn record_document_rejected(&self) {
        self.documents_rejected_total.inc();
    }

    pub fn observe_model_latency(&self, millis: f64) {
        self.model_latency_ms.observe(millis);
    }

    /// Encode all metrics in OpenMetrics text format.
    pub fn encode_text(&self) -> String {
        let registry = self.registry.lock().expect("metrics registry poisoned");
        let mut out = String::new();
        // Encoding into a String cannot fail in practice; fall back to empty.
        let _ = encode(&mut out, &registry);
        out
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_appear_in_encoding() {
        let metrics = GatewayMetrics::new();
        metrics.record_request("completed");
        metrics.record_request("denied");
        metrics.record_redaction("EMAIL");
        metrics.record_document_rejected();
        metrics.observe_model_latency(42.0);

        let text = metrics.encode_text();
        assert!(text.contains("wardgate_requests_total"));
        assert!(text.contains("outcome=\"denied\""));
        assert!(text.contains("wardgate_redactions_total"));
        assert!(text.contains("label=\"EMAIL\""));
        assert!(text.contains("wardgate_documents_rejected_total"));
        assert!(text.contains("wardgate_model_latency_ms"));
    }
}
