//! # Circuit Breaker Metrics
//!
//! Metrics collection for circuit breaker operations, used for monitoring,
//! alerting, and the `/health` endpoint's breaker summary.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics for a single circuit breaker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "healthy - normal operation",
            CircuitState::Open => "failing - rejecting all calls",
            CircuitState::HalfOpen => "recovering - testing system health",
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_healthy() {
        let metrics = CircuitBreakerMetrics::new();
        assert_eq!(metrics.current_state, CircuitState::Closed);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn high_failure_rate_closed_is_unhealthy() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.failure_rate = 0.2;
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn open_is_never_healthy() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.current_state = CircuitState::Open;
        assert!(!metrics.is_healthy());
    }
}
