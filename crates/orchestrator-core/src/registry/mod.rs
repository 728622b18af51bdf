//! # Worker Registry (C2)
//!
//! Maintains, for each worker type, a list of reachable endpoints. Two
//! discovery modes (cluster vs static), a companion health-probing loop,
//! and the `selectWorker` load-balancing policy (spec §4.2).

mod discovery;

pub use discovery::{HttpClusterDiscoveryClient, StaticDiscoveryClient};

use crate::model::{WorkerHealth, WorkerInstance};
use dashmap::DashMap;
use orchestrator_shared::config::RegistryConfig;
use std::sync::Arc;
use std::time::Duration;

/// Enum-dispatched discovery backend, matching the workspace's
/// no-trait-objects idiom for pluggable components with a small, closed
/// variant set.
pub enum DiscoveryBackend {
    Static(StaticDiscoveryClient),
    Cluster(HttpClusterDiscoveryClient),
}

impl DiscoveryBackend {
    async fn discover(&self, worker_type: &str) -> Vec<WorkerInstance> {
        match self {
            Self::Static(client) => client.discover(worker_type).await,
            Self::Cluster(client) => client.discover(worker_type).await,
        }
    }
}

/// Discovered worker instances, keyed by worker type, behind a read-mostly
/// snapshot (spec §5: "readers only, under a read-mostly lock; the
/// discovery loop replaces the snapshot atomically").
pub struct WorkerRegistry {
    backend: DiscoveryBackend,
    instances: DashMap<String, Vec<WorkerInstance>>,
    config: RegistryConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("worker_types", &self.instances.len())
            .finish()
    }
}

impl WorkerRegistry {
    pub fn new(backend: DiscoveryBackend, config: RegistryConfig) -> Self {
        Self {
            backend,
            instances: DashMap::new(),
            config,
            http: reqwest::Client::new(),
        }
    }

    /// The cluster-discovery circuit breaker, when running in cluster mode
    /// (spec §9 `/health`). Static mode has no network calls to guard.
    pub fn discovery_circuit_breaker(&self) -> Option<&orchestrator_shared::resilience::CircuitBreaker> {
        match &self.backend {
            DiscoveryBackend::Cluster(client) => Some(client.circuit_breaker()),
            DiscoveryBackend::Static(_) => None,
        }
    }

    /// Run one discovery pass for `worker_type`, replacing its snapshot.
    /// Newly discovered instances start `unknown` until the next health
    /// probe (spec §4.2).
    pub async fn discover(&self, worker_type: &str) {
        let discovered = self.backend.discover(worker_type).await;
        self.instances.insert(worker_type.to_string(), discovered);
    }

    /// Spawn the periodic discovery loop for a fixed set of worker types
    /// known to the catalog at startup.
    pub fn spawn_discovery_loop(self: &Arc<Self>, worker_types: Vec<String>) {
        if matches!(self.backend, DiscoveryBackend::Static(_)) {
            // Static mode reads env once; no periodic re-discovery needed,
            // but we still seed the initial snapshot.
            let this = Arc::clone(self);
            tokio::spawn(async move {
                for worker_type in &worker_types {
                    this.discover(worker_type).await;
                }
            });
            return;
        }
        let interval = Duration::from_secs(self.config.discovery_interval_secs);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                for worker_type in &worker_types {
                    this.discover(worker_type).await;
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    /// Spawn the health-probing loop: GET `<endpoint>/health` per instance
    /// at `health_check_interval_secs`, with a `health_check_timeout_secs`
    /// timeout (spec §4.2).
    pub fn spawn_health_check_loop(self: &Arc<Self>) {
        let interval = Duration::from_secs(self.config.health_check_interval_secs);
        let timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                this.probe_all(timeout).await;
                tokio::time::sleep(interval).await;
            }
        });
    }

    async fn probe_all(&self, timeout: Duration) {
        let worker_types: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for worker_type in worker_types {
            let Some(mut instances) = self.instances.get_mut(&worker_type).map(|e| e.clone()) else {
                continue;
            };
            for instance in instances.iter_mut() {
                instance.health = self.probe_one(&instance.endpoint, timeout).await;
                instance.last_health_check = Some(chrono::Utc::now());
            }
            self.instances.insert(worker_type, instances);
        }
    }

    async fn probe_one(&self, endpoint: &str, timeout: Duration) -> WorkerHealth {
        let url = format!("{endpoint}/health");
        match tokio::time::timeout(timeout, self.http.get(&url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => WorkerHealth::Healthy,
            _ => WorkerHealth::Unhealthy,
        }
    }

    /// `selectWorker(type) -> WorkerInstance | null` (spec §4.2): uniformly
    /// random among healthy instances; fall back to the first known
    /// instance if none are healthy (so dispatch can still be attempted
    /// and fail into retry); `None` if the type is entirely unknown.
    pub fn select_worker(&self, worker_type: &str) -> Option<WorkerInstance> {
        let instances = self.lookup(worker_type)?;
        if instances.is_empty() {
            return None;
        }
        let healthy: Vec<&WorkerInstance> = instances
            .iter()
            .filter(|i| i.health == WorkerHealth::Healthy)
            .collect();
        if !healthy.is_empty() {
            let index = fastrand::usize(..healthy.len());
            return Some(healthy[index].clone());
        }
        instances.first().cloned()
    }

    /// Exact match, then fuzzy substring containment, then the static pool
    /// as a last resort (spec §4.2: "request 'resume' and receive
    /// 'resume-worker'").
    fn lookup(&self, worker_type: &str) -> Option<Vec<WorkerInstance>> {
        if let Some(instances) = self.instances.get(worker_type) {
            return Some(instances.clone());
        }
        for entry in self.instances.iter() {
            if entry.key().contains(worker_type) || worker_type.contains(entry.key().as_str()) {
                return Some(entry.value().clone());
            }
        }
        self.static_pool_lookup(worker_type)
    }

    /// Last-resort fallback consulted when discovery has no entry at all
    /// for `worker_type`: an exact, then fuzzy, match against the
    /// statically configured `<TYPE>_WORKER_URL` endpoints (spec §4.2).
    /// Scoped strictly to explicit `static_urls` entries — it never
    /// synthesizes a default endpoint for an arbitrary type, since that
    /// would make an unknown worker type unselectable in name only.
    fn static_pool_lookup(&self, worker_type: &str) -> Option<Vec<WorkerInstance>> {
        let endpoint = self
            .config
            .static_urls
            .get(worker_type)
            .cloned()
            .or_else(|| {
                self.config.static_urls.iter().find_map(|(type_key, url)| {
                    if type_key.contains(worker_type) || worker_type.contains(type_key.as_str()) {
                        Some(url.clone())
                    } else {
                        None
                    }
                })
            })?;

        Some(vec![WorkerInstance {
            id: format!("{worker_type}-static-fallback"),
            worker_type: worker_type.to_string(),
            endpoint,
            health: WorkerHealth::Unknown,
            last_health_check: None,
            metadata: std::collections::HashMap::new(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instance(worker_type: &str, health: WorkerHealth) -> WorkerInstance {
        WorkerInstance {
            id: format!("{worker_type}-1"),
            worker_type: worker_type.to_string(),
            endpoint: format!("http://{worker_type}:3000"),
            health,
            last_health_check: None,
            metadata: HashMap::new(),
        }
    }

    fn registry_with(worker_type: &str, instances: Vec<WorkerInstance>) -> WorkerRegistry {
        let registry = WorkerRegistry::new(
            DiscoveryBackend::Static(StaticDiscoveryClient::new(RegistryConfig::default())),
            RegistryConfig::default(),
        );
        registry.instances.insert(worker_type.to_string(), instances);
        registry
    }

    #[test]
    fn selects_among_healthy_only() {
        let registry = registry_with(
            "llm",
            vec![
                instance("llm", WorkerHealth::Unhealthy),
                instance("llm", WorkerHealth::Healthy),
            ],
        );
        let selected = registry.select_worker("llm").unwrap();
        assert_eq!(selected.health, WorkerHealth::Healthy);
    }

    #[test]
    fn falls_back_to_first_known_when_none_healthy() {
        let registry = registry_with("llm", vec![instance("llm", WorkerHealth::Unhealthy)]);
        let selected = registry.select_worker("llm").unwrap();
        assert_eq!(selected.health, WorkerHealth::Unhealthy);
    }

    #[test]
    fn returns_none_for_unknown_type_with_no_fuzzy_match() {
        let registry = registry_with("llm", vec![instance("llm", WorkerHealth::Healthy)]);
        assert!(registry.select_worker("resume").is_none());
    }

    #[test]
    fn fuzzy_lookup_matches_by_substring() {
        let registry = registry_with("resume-worker", vec![instance("resume-worker", WorkerHealth::Healthy)]);
        let selected = registry.select_worker("resume").unwrap();
        assert_eq!(selected.worker_type, "resume-worker");
    }

    #[test]
    fn falls_back_to_static_pool_when_undiscovered() {
        let mut config = RegistryConfig::default();
        config
            .static_urls
            .insert("resume".to_string(), "http://resume-static:3000".to_string());
        let registry = WorkerRegistry::new(
            DiscoveryBackend::Static(StaticDiscoveryClient::new(config.clone())),
            config,
        );
        registry.instances.insert("llm".to_string(), vec![instance("llm", WorkerHealth::Healthy)]);

        let selected = registry.select_worker("resume").unwrap();
        assert_eq!(selected.endpoint, "http://resume-static:3000");
        assert_eq!(selected.health, WorkerHealth::Unknown);
    }

    #[test]
    fn static_pool_fallback_is_not_consulted_for_unconfigured_types() {
        let registry = registry_with("llm", vec![instance("llm", WorkerHealth::Healthy)]);
        assert!(registry.select_worker("resume").is_none());
    }
}
