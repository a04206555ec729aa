//! Operation metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.
//! - HTTP requests against the control plane (count, duration, retries)
//! - Engine operations by outcome

use std::time::{Duration, Instant};

/// Record HTTP request duration
pub fn record_request_duration(method: &str, duration: Duration) {
    metrics::histogram!(
        "esadmin_http_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a completed HTTP request; `status` is the HTTP code or an error kind
pub fn record_request(method: &str, status: &str) {
    metrics::counter!(
        "esadmin_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a retried read
pub fn record_retry(method: &str) {
    metrics::counter!(
        "esadmin_http_retries_total",
        "method" => method.to_string(),
    )
    .increment(1);
}

/// Record an engine operation outcome (accepted, denied, failed, ...)
pub fn record_operation(operation: &str, outcome: &str) {
    metrics::counter!(
        "esadmin_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Guard for timing a single HTTP attempt
pub struct RequestTimer {
    method: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            start: Instant::now(),
        }
    }

    /// Record the response status and duration
    pub fn finish(self, status: u16) {
        record_request_duration(&self.method, self.start.elapsed());
        record_request(&self.method, &status.to_string());
    }

    /// Record a request that got no usable response
    pub fn error(self, error_type: &str) {
        record_request_duration(&self.method, self.start.elapsed());
        record_request(&self.method, error_type);
    }
}
