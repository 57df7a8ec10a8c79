use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all playlog metrics
const PREFIX: &str = "playlog";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Ingestion Metrics
    pub static ref CANDIDATES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_candidates_total"), "Candidates seen by the watermark guard"),
        &["source", "outcome"]
    ).expect("Failed to create candidates_total metric");

    pub static ref ROWS_APPENDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_rows_appended_total"), "Rows written to the raw log"),
        &["source"]
    ).expect("Failed to create rows_appended_total metric");

    pub static ref ROWS_DEDUPLICATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{PREFIX}_rows_deduplicated_total"),
            "Rows skipped because their insert id already existed"
        ),
        &["source"]
    ).expect("Failed to create rows_deduplicated_total metric");

    pub static ref ROWS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_rows_rejected_total"), "Rows refused by the raw log"),
        &["source"]
    ).expect("Failed to create rows_rejected_total metric");

    // Enrichment Metrics
    pub static ref ENRICHED_ROWS: Gauge = Gauge::new(
        format!("{PREFIX}_enriched_rows"),
        "Rows in the last published enriched view"
    ).expect("Failed to create enriched_rows metric");

    pub static ref ENRICHMENT_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_enrichment_runs_total"), "Enrichment runs by result"),
        &["status"]
    ).expect("Failed to create enrichment_runs_total metric");

    // Webhook Metrics
    pub static ref WEBHOOK_SUBMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_webhook_submissions_total"), "Now-playing submissions"),
        &["status"]
    ).expect("Failed to create webhook_submissions_total metric");

    pub static ref RETRIES_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_retries_total"),
        "Runs retried after a transient failure"
    ).expect("Failed to create retries_total metric");
}

/// Initialize and register all metrics with the registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CANDIDATES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_APPENDED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_DEDUPLICATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_REJECTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENRICHED_ROWS.clone()));
    let _ = REGISTRY.register(Box::new(ENRICHMENT_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WEBHOOK_SUBMISSIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RETRIES_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// `outcome` is one of `accepted`, `skipped` or `invalid`.
pub fn record_candidates(source: &str, outcome: &str, count: usize) {
    CANDIDATES_TOTAL
        .with_label_values(&[source, outcome])
        .inc_by(count as u64);
}

pub fn record_append(source: &str, appended: usize, deduplicated: usize, rejected: usize) {
    ROWS_APPENDED_TOTAL
        .with_label_values(&[source])
        .inc_by(appended as u64);
    ROWS_DEDUPLICATED_TOTAL
        .with_label_values(&[source])
        .inc_by(deduplicated as u64);
    ROWS_REJECTED_TOTAL
        .with_label_values(&[source])
        .inc_by(rejected as u64);
}

pub fn record_enrichment_run(status: &str, published_rows: Option<usize>) {
    ENRICHMENT_RUNS_TOTAL.with_label_values(&[status]).inc();
    if let Some(rows) = published_rows {
        ENRICHED_ROWS.set(rows as f64);
    }
}

pub fn record_webhook_submission(status: &str) {
    WEBHOOK_SUBMISSIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_retry() {
    RETRIES_TOTAL.inc();
}

/// Handler for /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
