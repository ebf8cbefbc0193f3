//! Telemetry: Prometheus metrics
//!
//! Counters and histograms for the HTTP edge, tool calls, and upstream
//! requests. Tracing spans are emitted where the work happens; this module
//! only owns the metric statics and the text encoding for `/metrics`.

use crate::{GatewayError, Result};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// HTTP requests total counter
static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentry_mcp_http_requests_total",
        "Total number of HTTP requests received",
        &["path", "method", "code"]
    )
    .unwrap()
});

/// Tool call counter
static TOOL_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentry_mcp_tool_calls_total",
        "Total number of MCP tool calls",
        &["tool", "status"]
    )
    .unwrap()
});

/// Tool call duration histogram
static TOOL_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "sentry_mcp_tool_call_duration_seconds",
            "Duration of MCP tool calls in seconds"
        ),
        &["tool"]
    )
    .unwrap()
});

/// Record an HTTP request at the edge
pub fn record_http_request(path: &str, method: &str, status_code: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[path, method, &status_code.to_string()])
        .inc();
}

/// Record one tool call with its outcome and duration
pub fn record_tool_call(tool: &str, status: &str, duration_secs: f64) {
    TOOL_CALLS_TOTAL.with_label_values(&[tool, status]).inc();
    TOOL_CALL_DURATION
        .with_label_values(&[tool])
        .observe(duration_secs);
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GatewayError::internal(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| GatewayError::internal(format!("Failed to convert metrics to UTF-8: {}", e)))
}
