//! Prometheus metrics for the scan service
//!
//! This module provides metrics tracking for:
//! - Scans: outcome counts, end-to-end duration, retries by failure category
//! - Session pool: parked sessions, retired sessions by reason
//! - HTTP API: requests by endpoint and status
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scan and pool metrics
struct ScanMetrics {
    scans: CounterVec,
    scan_duration: Histogram,
    retries: CounterVec,
    retirements: CounterVec,
    parked_sessions: Gauge,
    purged_objects: CounterVec,
}

/// Container for HTTP API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static SCAN_METRICS: OnceLock<ScanMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = minion::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let scan = ScanMetrics {
        scans: register_counter_vec!(
            "minion_scans_total",
            "Total scan requests by outcome",
            &["outcome"]
        )?,
        scan_duration: register_histogram!(
            "minion_scan_duration_seconds",
            "End-to-end scan duration in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]
        )?,
        retries: register_counter_vec!(
            "minion_scan_retries_total",
            "Scan retries by failure category",
            &["category"]
        )?,
        retirements: register_counter_vec!(
            "minion_sessions_retired_total",
            "Sessions taken out of service by reason",
            &["reason"]
        )?,
        parked_sessions: register_gauge!(
            "minion_parked_sessions",
            "Sessions parked in the pool and ready for reuse"
        )?,
        purged_objects: register_counter_vec!(
            "minion_objects_purged_total",
            "Expired objects removed from the object store",
            &["kind"]
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "minion_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "minion_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    SCAN_METRICS
        .set(scan)
        .map_err(|_| "Scan metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCAN_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished scan and its duration
pub fn record_scan(outcome: &str, duration_secs: f64) {
    let Some(m) = SCAN_METRICS.get() else {
        return;
    };

    m.scans.with_label_values(&[outcome]).inc();
    m.scan_duration.observe(duration_secs);
}

/// Record a retry granted for a failure category
pub fn record_retry(category: &str) {
    if let Some(m) = SCAN_METRICS.get() {
        m.retries.with_label_values(&[category]).inc();
    }
}

/// Record a session leaving service for good
pub fn record_retirement(reason: &str) {
    if let Some(m) = SCAN_METRICS.get() {
        m.retirements.with_label_values(&[reason]).inc();
    }
}

pub fn set_parked_sessions(parked: usize) {
    if let Some(m) = SCAN_METRICS.get() {
        m.parked_sessions.set(parked as f64);
    }
}

pub fn record_purge(kind: &str, removed: usize) {
    if removed == 0 {
        return;
    }
    if let Some(m) = SCAN_METRICS.get() {
        m.purged_objects
            .with_label_values(&[kind])
            .inc_by(removed as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}
