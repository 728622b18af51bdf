//! # Configuration
//!
//! Layered configuration loader: a default TOML document baked into the
//! binary, overridden by environment variables, following the reference
//! architecture's `config` crate usage. One struct per concern, aggregated
//! into [`OrchestratorConfig`] and loaded once at bootstrap.

mod bus;
mod circuit_breaker;
mod registry;
mod store;

pub use bus::BusConfig;
pub use circuit_breaker::{CircuitBreakerComponentConfig, CircuitBreakersConfig};
pub use registry::{RegistryConfig, WorkerDiscoveryMode};
pub use store::StoreConfig;

use crate::error::{OrchestratorError, SharedResult};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub service_name: String,
    pub bus: BusConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
    pub circuit_breakers: CircuitBreakersConfig,
    /// Bounded pending-dispatch queue size per worker type before the API
    /// starts returning 503 (spec §5 backpressure).
    pub pending_dispatch_queue_size: usize,
    /// How long saturation must persist before 503s begin (milliseconds).
    pub saturation_threshold_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_name: "orchestrator-core".to_string(),
            bus: BusConfig::default(),
            registry: RegistryConfig::default(),
            store: StoreConfig::default(),
            circuit_breakers: CircuitBreakersConfig::default(),
            pending_dispatch_queue_size: 1024,
            saturation_threshold_ms: 60_000,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from an optional base TOML file plus environment
    /// variable overrides (`ORCHESTRATOR__BUS__CLIENT_ID`-style nested keys,
    /// and the flat spec §6 variables handled explicitly below).
    pub fn load() -> SharedResult<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::Environment::with_prefix("ORCHESTRATOR")
                    .separator("__")
                    .try_parsing(true),
            );

        builder = builder.set_override_option(
            "service_name",
            std::env::var("SERVICE_NAME").ok(),
        )?;
        builder = builder.set_override_option(
            "bus.brokers",
            std::env::var("BUS_BROKERS").ok(),
        )?;
        builder = builder.set_override_option(
            "bus.client_id",
            std::env::var("BUS_CLIENT_ID").ok(),
        )?;
        builder = builder.set_override_option(
            "bus.group_id",
            std::env::var("BUS_GROUP_ID").ok(),
        )?;
        builder = builder.set_override_option(
            "registry.discovery_mode",
            std::env::var("WORKER_DISCOVERY_MODE").ok(),
        )?;
        builder = builder.set_override_option(
            "registry.health_check_interval_secs",
            std::env::var("WORKER_HEALTH_CHECK_INTERVAL")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
        )?;
        builder = builder.set_override_option(
            "registry.health_check_timeout_secs",
            std::env::var("WORKER_HEALTH_CHECK_TIMEOUT")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
        )?;
        builder = builder.set_override_option(
            "store.connection_string",
            std::env::var("REQUEST_STORE_URL").ok(),
        )?;

        let config = builder.build()?;
        let mut parsed: Self = config.try_deserialize()?;
        parsed.registry.static_urls = Self::collect_static_worker_urls();
        Ok(parsed)
    }

    /// Collect `<TYPE>_WORKER_URL` environment variables for static
    /// discovery mode (spec §4.2 "Static mode").
    fn collect_static_worker_urls() -> std::collections::HashMap<String, String> {
        std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_suffix("_WORKER_URL")
                    .map(|prefix| (prefix.to_lowercase(), value))
            })
            .collect()
    }
}

pub(crate) fn parse_env_error(message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::config(message)
}
