//! Circuit breaker configuration adapters — converts TOML-shaped component
//! config into the resilience module's runtime [`CircuitBreakerConfig`].

use crate::resilience::CircuitBreakerConfig as ResilienceCircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-component circuit breaker knobs as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 30,
        }
    }
}

impl CircuitBreakerComponentConfig {
    pub fn to_resilience_config(&self) -> ResilienceCircuitBreakerConfig {
        ResilienceCircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_secs),
            success_threshold: self.success_threshold,
        }
    }
}

/// Circuit breakers guarding the Bus Port, the worker registry's
/// cluster-discovery calls, and step dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakersConfig {
    pub messaging: CircuitBreakerComponentConfig,
    pub registry_discovery: CircuitBreakerComponentConfig,
    pub dispatch: CircuitBreakerComponentConfig,
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        Self {
            messaging: CircuitBreakerComponentConfig::default(),
            registry_discovery: CircuitBreakerComponentConfig {
                failure_threshold: 3,
                success_threshold: 2,
                timeout_secs: 60,
            },
            dispatch: CircuitBreakerComponentConfig::default(),
        }
    }
}
