//! # Shared Error Types
//!
//! Unified error handling for the messaging, resilience, and configuration
//! layers. Domain errors (admission, dispatch, worker, timeout, conflict)
//! live in `orchestrator-core`; this crate only deals with infrastructure
//! failures that the core layer wraps and reacts to.

use thiserror::Error;

/// Result alias for shared-infrastructure operations.
pub type SharedResult<T> = Result<T, OrchestratorError>;

/// Errors raised by the messaging bus, resilience, and configuration layers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("bus port is not connected")]
    NotConnected,

    #[error("a handler is already subscribed to topic '{topic}'")]
    AlreadySubscribed { topic: String },

    #[error("subscribe called after the consumer loop has started for topic '{topic}'")]
    LateSubscribe { topic: String },

    #[error("circuit breaker '{name}' is open")]
    CircuitBreakerOpen { name: String },

    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn circuit_breaker_open(name: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen { name: name.into() }
    }

    /// Whether the failure is transient and worth retrying at the caller's
    /// discretion. Mirrors the taxonomy used by the scheduler's retry
    /// policy: network-shaped errors are retryable, protocol/config errors
    /// are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::CircuitBreakerOpen { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_is_recoverable() {
        assert!(OrchestratorError::NotConnected.is_recoverable());
    }

    #[test]
    fn config_error_is_not_recoverable() {
        assert!(!OrchestratorError::config("bad value").is_recoverable());
    }

    #[test]
    fn circuit_breaker_open_display() {
        let err = OrchestratorError::circuit_breaker_open("messaging");
        assert_eq!(err.to_string(), "circuit breaker 'messaging' is open");
    }
}
