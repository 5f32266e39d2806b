//! Prometheus metrics for monitoring the rental backend.
//!
//! Metrics are exposed in Prometheus text format on a dedicated listener
//! for scraping. Counters cover the auth core (logins, token rejections,
//! OTP traffic) and the device channel (dispatches, timeouts).

#![allow(dead_code)] // Public API; not every call site exists yet

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus metrics exporter.
///
/// Metrics become available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Record a login attempt.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record a rejected credential, labeled by the internal failure kind.
///
/// The kind is logged and counted here even though clients receive a
/// collapsed message.
pub fn token_rejections_total(kind: &str) {
    metrics::counter!("token_rejections_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an OTP send.
pub fn otp_sends_total() {
    metrics::counter!("otp_sends_total").increment(1);
}

/// Record an OTP verification attempt.
pub fn otp_verifications_total(success: bool) {
    metrics::counter!("otp_verifications_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record a session extension.
pub fn session_extensions_total() {
    metrics::counter!("session_extensions_total").increment(1);
}

/// Record a logout.
pub fn logouts_total() {
    metrics::counter!("logouts_total").increment(1);
}

// ============================================================================
// Device Channel Metrics
// ============================================================================

/// Set current registered device count.
pub fn devices_connected(count: usize) {
    metrics::gauge!("devices_connected").set(count as f64);
}

/// Record a device dispatch and its outcome.
pub fn device_dispatches_total(outcome: &str) {
    metrics::counter!("device_dispatches_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an inbound device channel message.
pub fn device_messages_received_total() {
    metrics::counter!("device_messages_received_total").increment(1);
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record an HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
