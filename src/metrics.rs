//! Metrics and telemetry for range queries
//!
//! This module provides Prometheus metrics for monitoring query volume,
//! latency, chunking behaviour, data read and memory pressure.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Query Counters ===

    /// Total queries by outcome
    pub static ref QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "rollup_queries_total",
        "Total range queries by status",
        &["status"]
    ).unwrap();

    /// Query passes executed by memory-constrained queries
    pub static ref QUERY_CHUNKS: Counter = register_counter!(
        "rollup_query_chunks_total",
        "Total sub-range passes executed by chunked queries"
    ).unwrap();

    /// Sample blocks read from the store
    pub static ref BLOCKS_READ: Counter = register_counter!(
        "rollup_blocks_read_total",
        "Total sample blocks decoded from the store"
    ).unwrap();

    /// Datapoints returned to callers
    pub static ref DATAPOINTS_RETURNED: Counter = register_counter!(
        "rollup_datapoints_returned_total",
        "Total datapoints returned by range queries"
    ).unwrap();

    // === Latency Histograms ===

    /// Query duration by execution mode
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "rollup_query_duration_seconds",
        "Range query latency in seconds",
        &["mode"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // === Resource Gauges ===

    /// Bytes reserved per memory monitor
    pub static ref MEMORY_BYTES: GaugeVec = register_gauge_vec!(
        "rollup_memory_bytes",
        "Bytes reserved by memory monitor",
        &["monitor"]
    ).unwrap();
}

/// Get metrics in Prometheus text format
///
/// # Returns
///
/// Result containing the formatted metrics string, or an error if encoding fails
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a finished query
#[inline]
pub fn record_query(mode: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    QUERIES_TOTAL.with_label_values(&[status]).inc();
    QUERY_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record one pass of a chunked query
#[inline]
pub fn record_chunk() {
    QUERY_CHUNKS.inc();
}

/// Record blocks decoded from the store
#[inline]
pub fn record_blocks_read(count: usize) {
    BLOCKS_READ.inc_by(count as f64);
}

/// Record datapoints returned to a caller
#[inline]
pub fn record_datapoints(count: usize) {
    DATAPOINTS_RETURNED.inc_by(count as f64);
}

/// Update bytes reserved by a memory monitor
#[inline]
pub fn update_memory(monitor: &str, bytes: i64) {
    MEMORY_BYTES.with_label_values(&[monitor]).set(bytes as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_query() {
        record_query("single", 0.001, true);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("rollup_queries_total"));
        assert!(metrics.contains("rollup_query_duration_seconds"));
    }

    #[test]
    fn test_counters_accumulate() {
        let before = BLOCKS_READ.get();
        record_blocks_read(3);
        assert!(BLOCKS_READ.get() >= before + 3.0);
    }
}
