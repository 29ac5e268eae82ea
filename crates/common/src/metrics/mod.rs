//! Metrics and observability utilities
//!
//! Prometheus metrics through the `metrics` facade with standardized
//! naming. Recording is a no-op until an exporter is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all Dossier metrics
pub const METRICS_PREFIX: &str = "dossier";

/// Histogram buckets for request and storage latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for document processing (extraction is slower)
pub const PROCESSING_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.250, // 250ms
    1.000, // 1s
    5.000, // 5s
    15.00, // 15s
    60.00, // 1m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Uploads by outcome (uploaded, rejected)"
    );

    describe_counter!(
        format!("{}_upload_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Bytes accepted through uploads"
    );

    // Processing metrics
    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Background processing runs by outcome"
    );

    describe_histogram!(
        format!("{}_processing_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document processing latency in seconds"
    );

    describe_counter!(
        format!("{}_entities_extracted_total", METRICS_PREFIX),
        Unit::Count,
        "Entities extracted from processed documents"
    );

    // Queue metrics
    describe_gauge!(
        format!("{}_queue_depth", METRICS_PREFIX),
        Unit::Count,
        "Processing jobs waiting for a worker"
    );

    describe_counter!(
        format!("{}_queue_deferred_total", METRICS_PREFIX),
        Unit::Count,
        "Jobs left to the backlog because the queue was full or closed"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search query latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of matches for the last search"
    );

    // Storage metrics
    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Storage call latency in seconds"
    );

    describe_counter!(
        format!("{}_db_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "Storage calls that exceeded the query timeout"
    );

    tracing::info!("Metrics registered");
}

/// Serve Prometheus metrics on `port` and register descriptions.
///
/// Must be called from inside a Tokio runtime.
pub fn install_exporter(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_processing_duration_seconds", METRICS_PREFIX)),
            PROCESSING_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), LATENCY_BUCKETS)?
        .install()?;

    register_metrics();
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record an upload decision
pub fn record_upload(accepted: bool, format: &str, bytes: u64) {
    let outcome = if accepted { "uploaded" } else { "rejected" };

    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "outcome" => outcome,
        "format" => format.to_string()
    )
    .increment(1);

    if accepted {
        counter!(format!("{}_upload_bytes_total", METRICS_PREFIX)).increment(bytes);
    }
}

/// Record one background processing run
pub fn record_processing(duration_secs: f64, format: &str, success: bool, entities: usize) {
    let outcome = if success { "completed" } else { "failed" };

    counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        "outcome" => outcome,
        "format" => format.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_processing_duration_seconds", METRICS_PREFIX),
        "format" => format.to_string()
    )
    .record(duration_secs);

    if success {
        counter!(format!("{}_entities_extracted_total", METRICS_PREFIX)).increment(entities as u64);
    }
}

/// Track jobs waiting in the processing queue
pub fn set_queue_depth(depth: usize) {
    gauge!(format!("{}_queue_depth", METRICS_PREFIX)).set(depth as f64);
}

/// Record a job that could not be queued
pub fn record_queue_deferred(reason: &'static str) {
    counter!(
        format!("{}_queue_deferred_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, mode: &str, result_count: u64) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Record a storage call
pub fn record_storage(operation: &'static str, duration_secs: f64, timed_out: bool) {
    histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        "operation" => operation
    )
    .record(duration_secs);

    if timed_out {
        counter!(
            format!("{}_db_timeouts_total", METRICS_PREFIX),
            "operation" => operation
        )
        .increment(1);
    }
}
