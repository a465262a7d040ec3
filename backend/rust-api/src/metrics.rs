use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Ledger Metrics
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exercise_submissions_total",
        "Total number of committed exercise submissions",
        &["correct"]
    )
    .unwrap();

    pub static ref EXP_AWARDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exp_awarded_total",
        "Total EXP credited to user accounts",
        &["source"]
    )
    .unwrap();

    pub static ref PART_COMPLETIONS_TOTAL: IntCounter = register_int_counter!(
        "part_completions_total",
        "Number of parts completed for the first time"
    )
    .unwrap();

    pub static ref STORE_TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_transactions_total",
        "Ledger transactions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref READ_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "progress_read_fallbacks_total",
        "Read projections served as defaults after a store failure",
        &["projection"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

pub fn record_transaction(outcome: &str) {
    STORE_TRANSACTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_read_fallback(projection: &str) {
    READ_FALLBACKS_TOTAL.with_label_values(&[projection]).inc();
}
