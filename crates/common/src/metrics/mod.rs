//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming. Recording goes through
//! the `metrics` facade, so calls are no-ops until a recorder is installed.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all PaperTrail metrics
pub const METRICS_PREFIX: &str = "papertrail";

/// Buckets for embedding latency (in seconds)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Indexing metrics
    describe_counter!(
        format!("{}_documents_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Documents that produced at least one chunk"
    );

    describe_counter!(
        format!("{}_documents_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Documents skipped because of empty text or collaborator failures"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_counter!(
        format!("{}_oversize_sentences_total", METRICS_PREFIX),
        Unit::Count,
        "Single sentences exceeding the chunk token budget"
    );

    describe_counter!(
        format!("{}_grouping_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Documents chunked whole after a grouping failure"
    );

    describe_histogram!(
        format!("{}_indexing_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Full index build latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of index searches"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search latency in seconds"
    );

    describe_counter!(
        format!("{}_dedup_collisions_total", METRICS_PREFIX),
        Unit::Count,
        "Duplicate hits removed while merging sub-query results"
    );

    describe_counter!(
        format!("{}_decomposition_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Queries searched undecomposed after decomposition failed"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, hits: usize) {
    counter!(format!("{}_search_queries_total", METRICS_PREFIX)).increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "empty" => (hits == 0).to_string()
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model = model, batch_size = batch_size, "Embedding batch recorded");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a finished index build
pub fn record_indexing(duration_secs: f64, documents: usize, skipped: usize, chunks: usize) {
    counter!(format!("{}_documents_indexed_total", METRICS_PREFIX)).increment(documents as u64);
    counter!(format!("{}_documents_skipped_total", METRICS_PREFIX)).increment(skipped as u64);
    counter!(format!("{}_chunks_created_total", METRICS_PREFIX)).increment(chunks as u64);
    histogram!(format!("{}_indexing_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Increment a named counter by one
pub fn increment(name: &str) {
    counter!(format!("{}_{}", METRICS_PREFIX, name)).increment(1);
}

/// Increment a named counter by `n`
pub fn increment_by(name: &str, n: u64) {
    counter!(format!("{}_{}", METRICS_PREFIX, name)).increment(n);
}
