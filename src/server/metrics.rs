use crate::collections::ReconcileReport;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all metrics of this service
const PREFIX: &str = "genre_collections";

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
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job runs by outcome"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job run duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "1 while a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    pub static ref BACKGROUND_JOB_PROGRESS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_progress_percent"), "Completion of the current run"),
        &["job_id"]
    ).expect("Failed to create background_job_progress_percent metric");

    // Collection Metrics
    pub static ref COLLECTIONS_CREATED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_collections_created_total"),
        "Genre collections created"
    ).expect("Failed to create collections_created_total metric");

    pub static ref COLLECTION_LINKS_ADDED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_collection_links_added_total"),
        "Movies linked into genre collections"
    ).expect("Failed to create collection_links_added_total metric");

    pub static ref RECOVERABLE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_recoverable_failures_total"), "Genre tags skipped because of a store error"),
        &["kind"]
    ).expect("Failed to create recoverable_failures_total metric");

    pub static ref FAVORITES_SET_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_pinned_favorites_set_total"),
        "Favorite flags set from pinned collections"
    ).expect("Failed to create pinned_favorites_set_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_PROGRESS.clone()));
    let _ = REGISTRY.register(Box::new(COLLECTIONS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(COLLECTION_LINKS_ADDED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECOVERABLE_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FAVORITES_SET_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn init_catalog_metrics(num_movies: usize, num_collections: usize) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["movie"])
        .set(num_movies as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["collection"])
        .set(num_collections as f64);

    tracing::info!(
        "Catalog metrics initialized: {} movies, {} collections",
        num_movies,
        num_collections
    );
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn set_background_job_progress(job_id: &str, percent: f64) {
    BACKGROUND_JOB_PROGRESS
        .with_label_values(&[job_id])
        .set(percent);
}

/// `status` is one of "success", "failed", "cancelled", "panic".
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn record_genre_reconcile(report: &ReconcileReport) {
    COLLECTIONS_CREATED_TOTAL.inc_by(report.collections_created as u64);
    COLLECTION_LINKS_ADDED_TOTAL.inc_by(report.links_added as u64);
    for failure in &report.failures {
        RECOVERABLE_FAILURES_TOTAL
            .with_label_values(&[failure.kind.as_str()])
            .inc();
    }
}

pub fn record_favorites_set(count: usize) {
    FAVORITES_SET_TOTAL.inc_by(count as u64);
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

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
