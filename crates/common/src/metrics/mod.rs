//! Metrics and observability utilities
//!
//! Names and units for every metric the engine emits, registered once
//! at startup. Exporter wiring is the embedding application's concern.

use metrics::{describe_counter, describe_histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Veridoc metrics
pub const METRICS_PREFIX: &str = "veridoc";

/// Histogram buckets for query latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_ingest_documents_total", METRICS_PREFIX),
        Unit::Count,
        "Documents accepted by the ingestion pipeline"
    );

    describe_counter!(
        format!("{}_ingest_chunks_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks written to the indices"
    );

    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Queries processed, labeled by terminal status"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_histogram!(
        format!("{}_agent_iterations", METRICS_PREFIX),
        Unit::Count,
        "Re-search iterations used per query"
    );

    describe_counter!(
        format!("{}_retrieval_degraded_total", METRICS_PREFIX),
        Unit::Count,
        "Retrieval passes that lost a branch or the reranker"
    );
}

/// Timer measuring elapsed seconds for a histogram observation
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
