//! Metrics collection and exposition.
//!
//! # Metrics
//! - `waitlist_submissions_total` (counter): finished submissions by `outcome`
//!   (`inserted`, `updated`, `honeypot`, or the error code)
//! - `waitlist_honeypot_total` (counter): submissions discarded by the honeypot
//! - `waitlist_rate_limited_total` (counter): rejections by limiter `backend`
//! - `waitlist_stage_duration_seconds` (histogram): external call latency by `stage`
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

const SUBMISSIONS_TOTAL: &str = "waitlist_submissions_total";
const HONEYPOT_TOTAL: &str = "waitlist_honeypot_total";
const RATE_LIMITED_TOTAL: &str = "waitlist_rate_limited_total";
const STAGE_DURATION: &str = "waitlist_stage_duration_seconds";

/// Buckets covering a fast in-process call up to the 5 s external deadline.
const STAGE_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(STAGE_BUCKETS)
        .map_err(|e| format!("failed to configure histogram buckets: {}", e))?
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {}", e))?;

    tracing::info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record the final outcome of one submission.
#[inline]
pub fn record_submission(outcome: &'static str) {
    counter!(SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_honeypot() {
    counter!(HONEYPOT_TOTAL).increment(1);
}

#[inline]
pub fn record_rate_limited(backend: &'static str) {
    counter!(RATE_LIMITED_TOTAL, "backend" => backend).increment(1);
}

/// Record how long a pipeline stage took, measured from `start`.
#[inline]
pub fn record_stage_duration(stage: &'static str, start: Instant) {
    histogram!(STAGE_DURATION, "stage" => stage).record(start.elapsed().as_secs_f64());
}
