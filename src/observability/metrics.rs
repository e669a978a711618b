//! # Metrics
//!
//! Prometheus metrics for monitoring the plugin.
//!
//! ## Metrics Exposed
//!
//! - `secret_volume_backend_requests_total` - Backend calls by backend and operation
//! - `secret_volume_backend_errors_total` - Failed backend calls by backend and operation
//! - `secret_volume_backend_request_duration_seconds` - Duration of backend calls
//! - `secret_volume_token_acquisitions_total` - Bearer tokens fetched from an identity endpoint
//! - `secret_volume_files_written_total` - Secret files (re)written
//! - `secret_volume_files_unchanged_total` - Fetches skipped because the file already matched
//! - `secret_volume_volumes_tracked` - Volumes currently in the registry
//! - `secret_volume_volumes_valid` - Tracked volumes that satisfy the naming policy
//! - `secret_volume_refresh_sweeps_total` - Completed refresh sweeps
//! - `secret_volume_refresh_sweep_duration_seconds` - Duration of refresh sweeps

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static BACKEND_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_volume_backend_requests_total",
            "Total number of backend requests by backend and operation",
        ),
        &["backend", "operation"],
    )
    .expect("Failed to create BACKEND_REQUESTS_TOTAL metric - this should never happen")
});

static BACKEND_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_volume_backend_errors_total",
            "Total number of failed backend requests by backend and operation",
        ),
        &["backend", "operation"],
    )
    .expect("Failed to create BACKEND_ERRORS_TOTAL metric - this should never happen")
});

static BACKEND_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_volume_backend_request_duration_seconds",
            "Duration of backend requests in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["backend", "operation"],
    )
    .expect("Failed to create BACKEND_REQUEST_DURATION metric - this should never happen")
});

static TOKEN_ACQUISITIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_volume_token_acquisitions_total",
        "Total number of bearer tokens acquired from an identity endpoint",
    )
    .expect("Failed to create TOKEN_ACQUISITIONS_TOTAL metric - this should never happen")
});

static FILES_WRITTEN_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_volume_files_written_total",
        "Total number of secret files written",
    )
    .expect("Failed to create FILES_WRITTEN_TOTAL metric - this should never happen")
});

static FILES_UNCHANGED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_volume_files_unchanged_total",
        "Total number of fetches whose value already matched the secret file",
    )
    .expect("Failed to create FILES_UNCHANGED_TOTAL metric - this should never happen")
});

static VOLUMES_TRACKED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "secret_volume_volumes_tracked",
        "Current number of volumes in the registry",
    )
    .expect("Failed to create VOLUMES_TRACKED metric - this should never happen")
});

static VOLUMES_VALID: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "secret_volume_volumes_valid",
        "Current number of tracked volumes that can be mounted",
    )
    .expect("Failed to create VOLUMES_VALID metric - this should never happen")
});

static REFRESH_SWEEPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_volume_refresh_sweeps_total",
        "Total number of completed refresh sweeps",
    )
    .expect("Failed to create REFRESH_SWEEPS_TOTAL metric - this should never happen")
});

static REFRESH_SWEEP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "secret_volume_refresh_sweep_duration_seconds",
            "Duration of refresh sweeps in seconds",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
    )
    .expect("Failed to create REFRESH_SWEEP_DURATION metric - this should never happen")
});

/// Register all metrics with the registry served on `/metrics`
///
/// # Errors
/// Returns an error if a metric is registered twice
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(BACKEND_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(TOKEN_ACQUISITIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FILES_WRITTEN_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FILES_UNCHANGED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VOLUMES_TRACKED.clone()))?;
    REGISTRY.register(Box::new(VOLUMES_VALID.clone()))?;
    REGISTRY.register(Box::new(REFRESH_SWEEPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REFRESH_SWEEP_DURATION.clone()))?;

    Ok(())
}

/// Record one backend call and its duration
pub fn record_backend_request(backend: &str, operation: &str, duration: f64) {
    BACKEND_REQUESTS_TOTAL
        .with_label_values(&[backend, operation])
        .inc();
    BACKEND_REQUEST_DURATION
        .with_label_values(&[backend, operation])
        .observe(duration);
}

pub fn increment_backend_errors(backend: &str, operation: &str) {
    BACKEND_ERRORS_TOTAL
        .with_label_values(&[backend, operation])
        .inc();
}

pub fn increment_token_acquisitions() {
    TOKEN_ACQUISITIONS_TOTAL.inc();
}

pub fn increment_files_written() {
    FILES_WRITTEN_TOTAL.inc();
}

pub fn increment_files_unchanged() {
    FILES_UNCHANGED_TOTAL.inc();
}

pub fn set_volumes(tracked: usize, valid: usize) {
    VOLUMES_TRACKED.set(i64::try_from(tracked).unwrap_or(i64::MAX));
    VOLUMES_VALID.set(i64::try_from(valid).unwrap_or(i64::MAX));
}

pub fn observe_refresh_sweep(duration: f64) {
    REFRESH_SWEEPS_TOTAL.inc();
    REFRESH_SWEEP_DURATION.observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_request_counters_are_labelled() {
        let before = BACKEND_REQUESTS_TOTAL
            .with_label_values(&["test-backend", "probe"])
            .get();
        record_backend_request("test-backend", "probe", 0.2);
        let after = BACKEND_REQUESTS_TOTAL
            .with_label_values(&["test-backend", "probe"])
            .get();
        assert_eq!(after, before + 1);
    }
}
