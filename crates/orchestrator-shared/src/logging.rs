//! # Logging
//!
//! Structured tracing setup shared by every binary in the workspace.
//! Every log record carries `service_name`; request-scoped fields
//! (`request_id`, `correlation_id`, `user_id`) are attached by callers via
//! `tracing::Span` rather than threaded through function signatures.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Reads `RUST_LOG`, defaulting
/// to `info` for this crate's own targets and `warn` elsewhere. JSON output
/// when `ORCHESTRATOR_LOG_FORMAT=json` is set, human-readable otherwise.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{service_name}=debug")));

    let json_output = std::env::var("ORCHESTRATOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if json_output {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
