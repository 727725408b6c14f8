//! Metrics and observability utilities
//!
//! Provides metric registration and recording helpers with standardized
//! naming conventions for the retrieval stages.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

use crate::config::ObservabilityConfig;

/// Metrics prefix for all ShotScout metrics
pub const METRICS_PREFIX: &str = "shotscout";

/// Initialize the global tracing subscriber from configuration. `RUST_LOG`
/// wins over the configured level when set.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of candidate search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Candidate search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from candidate search"
    );

    // Alignment metrics
    describe_counter!(
        format!("{}_alignment_shots_total", METRICS_PREFIX),
        Unit::Count,
        "Total shots scored by temporal alignment"
    );

    describe_counter!(
        format!("{}_alignment_shots_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Shots skipped during temporal alignment"
    );

    // Rerank metrics
    describe_counter!(
        format!("{}_rerank_batches_total", METRICS_PREFIX),
        Unit::Count,
        "Total rerank batches dispatched"
    );

    describe_counter!(
        format!("{}_rerank_batches_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Rerank batches dropped after scorer failure"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record candidate search metrics
pub fn record_search(duration_secs: f64, modality: &str, granularity: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "modality" => modality.to_string(),
        "granularity" => granularity.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "modality" => modality.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "modality" => modality.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record temporal alignment metrics
pub fn record_alignment(scored: usize, skipped: usize) {
    counter!(format!("{}_alignment_shots_total", METRICS_PREFIX)).increment(scored as u64);
    counter!(format!("{}_alignment_shots_skipped_total", METRICS_PREFIX))
        .increment(skipped as u64);
}

/// Helper to record rerank batch metrics
pub fn record_rerank(batches: usize, failed: usize) {
    counter!(format!("{}_rerank_batches_total", METRICS_PREFIX)).increment(batches as u64);
    counter!(format!("{}_rerank_batches_failed_total", METRICS_PREFIX))
        .increment(failed as u64);
}

/// Helper to record an embedding request
pub fn record_embedding(model: &str, batch_size: usize) {
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(batch_size.max(1) as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_is_panic_free() {
        register_metrics();
        record_search(0.01, "similarity", "frame", 10);
        record_alignment(8, 2);
        record_rerank(4, 1);
        record_embedding("clip-vit-l-14", 3);
    }
}
