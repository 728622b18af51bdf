//! Worker Registry configuration (spec §4.2, §6 `WORKER_DISCOVERY_MODE`, …).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discovery mode selected by `WORKER_DISCOVERY_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerDiscoveryMode {
    /// Query the cluster orchestrator's service API every 30s.
    Kubernetes,
    /// Read `<TYPE>_WORKER_URL` environment variables once at startup.
    Static,
}

impl Default for WorkerDiscoveryMode {
    fn default() -> Self {
        Self::Static
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub discovery_mode: WorkerDiscoveryMode,
    /// Cluster discovery poll interval, seconds (default 30s per spec §4.2).
    pub discovery_interval_secs: u64,
    /// Health probe interval, seconds (default 30s per spec §4.2).
    pub health_check_interval_secs: u64,
    /// Health probe timeout, seconds (default 5s per spec §4.2).
    pub health_check_timeout_secs: u64,
    /// `<type>` → base URL, populated from `<TYPE>_WORKER_URL` env vars in
    /// static mode. Not serialized into the default TOML document; filled
    /// in by [`super::OrchestratorConfig::load`].
    #[serde(skip)]
    pub static_urls: HashMap<String, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            discovery_mode: WorkerDiscoveryMode::default(),
            discovery_interval_secs: 30,
            health_check_interval_secs: 30,
            health_check_timeout_secs: 5,
            static_urls: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Default static endpoint for a worker type not present in
    /// `static_urls`: `http://<type>:3000` per spec §4.2.
    pub fn default_static_endpoint(worker_type: &str) -> String {
        format!("http://{worker_type}:3000")
    }

    pub fn static_endpoint_for(&self, worker_type: &str) -> String {
        self.static_urls
            .get(worker_type)
            .cloned()
            .unwrap_or_else(|| Self::default_static_endpoint(worker_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_static_endpoint_pattern() {
        assert_eq!(
            RegistryConfig::default_static_endpoint("resume"),
            "http://resume:3000"
        );
    }

    #[test]
    fn static_endpoint_prefers_configured_url() {
        let mut config = RegistryConfig::default();
        config
            .static_urls
            .insert("llm".to_string(), "http://llm-worker.internal:8080".to_string());
        assert_eq!(
            config.static_endpoint_for("llm"),
            "http://llm-worker.internal:8080"
        );
        assert_eq!(
            config.static_endpoint_for("resume"),
            "http://resume:3000"
        );
    }
}
