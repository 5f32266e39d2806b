//! Structured logging configuration.
//!
//! Provides tracing-based logging with request correlation and security
//! event helpers. Log levels are configurable via `RUST_LOG`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// # Example
///
/// ```no_run
/// use rv_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a security event with structured data.
///
/// Token verification failures, session mismatches, and cross-tenant
/// device access attempts all route through here so they can be filtered
/// and alerted on uniformly.
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}

/// Log a slow operation.
///
/// Anything above one second is promoted to a warning.
#[allow(dead_code)]
pub fn log_slow_operation(operation: &str, duration_ms: u64) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            "Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_security_event() {
        // Just ensure it doesn't panic
        log_security_event("token_rejected", Some(1), Some("127.0.0.1"), "Test message");
        log_security_event("cross_tenant_device_access", None, None, "Test message");
    }

    #[test]
    fn test_log_slow_operation() {
        log_slow_operation("session_lookup", 5);
        log_slow_operation("session_lookup", 1500);
    }
}
