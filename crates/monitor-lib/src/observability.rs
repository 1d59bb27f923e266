//! Observability infrastructure for the query layer
//!
//! Provides:
//! - Prometheus self-metrics (query latency, validation failures, backend errors, emitted metrics)
//! - Structured JSON logging with tracing

use crate::level::MonitorLevel;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for query latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<QueryMetricsInner> = OnceLock::new();

struct QueryMetricsInner {
    query_latency_seconds: HistogramVec,
    validation_failures: IntCounterVec,
    backend_errors: IntCounterVec,
    metrics_emitted: IntCounter,
}

impl QueryMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram_vec!(
                "monitor_query_latency_seconds",
                "Time spent resolving a metric query",
                &["level"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            validation_failures: register_int_counter_vec!(
                "monitor_validation_failures_total",
                "Total number of requests rejected by parameter validation",
                &["level"]
            )
            .expect("Failed to register validation_failures"),

            backend_errors: register_int_counter_vec!(
                "monitor_backend_errors_total",
                "Total number of backend failures reported on metrics",
                &["backend"]
            )
            .expect("Failed to register backend_errors"),

            metrics_emitted: register_int_counter!(
                "monitor_metrics_emitted_total",
                "Total number of metrics returned to callers"
            )
            .expect("Failed to register metrics_emitted"),
        }
    }
}

/// Query-layer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct QueryMetrics {
    _private: (),
}

impl Default for QueryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryMetrics {
    /// Create a handle, registering the global metrics on first call
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(QueryMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &QueryMetricsInner {
        GLOBAL_METRICS.get_or_init(QueryMetricsInner::new)
    }

    /// `level` is `expression` for raw-expression queries
    pub fn observe_query_latency(&self, level: &str, duration_secs: f64) {
        self.inner()
            .query_latency_seconds
            .with_label_values(&[level])
            .observe(duration_secs);
    }

    pub fn inc_validation_failures(&self, level: &str) {
        self.inner()
            .validation_failures
            .with_label_values(&[level])
            .inc();
    }

    pub fn inc_backend_errors(&self, backend: &str) {
        self.inner()
            .backend_errors
            .with_label_values(&[backend])
            .inc();
    }

    pub fn add_metrics_emitted(&self, count: usize) {
        self.inner().metrics_emitted.inc_by(count as u64);
    }
}

/// Structured logger for query events
#[derive(Clone)]
pub struct QueryLogger {
    instance: String,
}

impl QueryLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a resolved query
    pub fn log_query_resolved(
        &self,
        level: MonitorLevel,
        instant: bool,
        requested_metrics: usize,
        returned_metrics: usize,
        failed_metrics: usize,
        duration_ms: u128,
    ) {
        info!(
            event = "query_resolved",
            instance = %self.instance,
            level = %level,
            instant = instant,
            requested_metrics = requested_metrics,
            returned_metrics = returned_metrics,
            failed_metrics = failed_metrics,
            duration_ms = duration_ms as u64,
            "Resolved metric query"
        );
    }

    /// Log a raw-expression query
    pub fn log_expression_resolved(&self, expression: &str, series: usize, failed: bool) {
        info!(
            event = "expression_resolved",
            instance = %self.instance,
            expression = %expression,
            series = series,
            failed = failed,
            "Resolved expression query"
        );
    }

    /// Log a request rejected before any backend call
    pub fn log_validation_rejected(&self, level: &str, reason: &str) {
        info!(
            event = "validation_rejected",
            instance = %self.instance,
            level = %level,
            reason = %reason,
            "Rejected query parameters"
        );
    }

    /// Log a backend failure that degraded results
    pub fn log_backend_degraded(&self, backend: &str, metric: &str, error: &str) {
        warn!(
            event = "backend_degraded",
            instance = %self.instance,
            backend = %backend,
            metric = %metric,
            error = %error,
            "Backend failed, reporting error on metric"
        );
    }

    /// Log a level that the selected backend cannot derive
    pub fn log_no_derivation(&self, level: MonitorLevel) {
        info!(
            event = "no_derivation",
            instance = %self.instance,
            level = %level,
            "No derivation available for level"
        );
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str, metrics_api: bool, time_series: bool) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            metrics_api = metrics_api,
            time_series = time_series,
            "Monitoring query server started"
        );
    }

    /// Log server shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Monitoring query server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_metrics_creation() {
        let metrics = QueryMetrics::new();

        metrics.observe_query_latency("node", 0.012);
        metrics.inc_validation_failures("node");
        metrics.inc_backend_errors("usage");
        metrics.add_metrics_emitted(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "monitor_metrics_emitted_total"));
    }

    #[test]
    fn test_query_logger_creation() {
        let logger = QueryLogger::new("monitor-api-0");
        assert_eq!(logger.instance, "monitor-api-0");
    }
}
