//! Discovery backends for the Worker Registry: static env-var endpoints and
//! a cluster orchestrator's service API (spec §4.2).

use crate::model::{WorkerHealth, WorkerInstance};
use orchestrator_shared::config::RegistryConfig;
use orchestrator_shared::resilience::{CircuitBreaker, CircuitBreakerConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;

/// Static mode: read `<TYPE>_WORKER_URL` once at startup, default to
/// `http://<type>:3000`.
pub struct StaticDiscoveryClient {
    config: RegistryConfig,
}

impl StaticDiscoveryClient {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    pub async fn discover(&self, worker_type: &str) -> Vec<WorkerInstance> {
        let endpoint = self.config.static_endpoint_for(worker_type);
        vec![WorkerInstance {
            id: format!("{worker_type}-static"),
            worker_type: worker_type.to_string(),
            endpoint,
            health: WorkerHealth::Unknown,
            last_health_check: None,
            metadata: HashMap::new(),
        }]
    }
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    name: String,
    ports: Vec<ServicePort>,
}

#[derive(Debug, Deserialize)]
struct ServicePort {
    port: u16,
}

/// Cluster-discovery mode: query the cluster orchestrator's service API
/// for services labelled `app=<workerType>` every poll (spec §4.2).
pub struct HttpClusterDiscoveryClient {
    api_base_url: String,
    http: reqwest::Client,
    circuit_breaker: CircuitBreaker,
}

impl HttpClusterDiscoveryClient {
    pub fn new(api_base_url: String) -> Self {
        Self::with_circuit_breaker_config(api_base_url, CircuitBreakerConfig::default())
    }

    pub fn with_circuit_breaker_config(api_base_url: String, circuit_breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            api_base_url,
            http: reqwest::Client::new(),
            circuit_breaker: CircuitBreaker::new("registry.discovery".to_string(), circuit_breaker_config),
        }
    }

    /// Current state of the cluster-discovery circuit breaker, for `/health`.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub async fn discover(&self, worker_type: &str) -> Vec<WorkerInstance> {
        if !self.circuit_breaker.should_allow() {
            tracing::warn!(worker_type, "cluster discovery circuit breaker open, skipping poll");
            return Vec::new();
        }
        let url = format!("{}/services?label=app={worker_type}", self.api_base_url);
        let started = Instant::now();
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                self.circuit_breaker.record_failure_manual(started.elapsed());
                tracing::warn!(worker_type, %error, "cluster discovery query failed");
                return Vec::new();
            }
        };
        let services: Vec<ServiceEntry> = match response.json().await {
            Ok(services) => services,
            Err(error) => {
                self.circuit_breaker.record_failure_manual(started.elapsed());
                tracing::warn!(worker_type, %error, "cluster discovery response malformed");
                return Vec::new();
            }
        };
        self.circuit_breaker.record_success_manual(started.elapsed());
        services
            .into_iter()
            .filter_map(|service| {
                let port = service.ports.first()?.port;
                Some(WorkerInstance {
                    id: service.name.clone(),
                    worker_type: worker_type.to_string(),
                    endpoint: format!("http://{}:{port}", service.name),
                    health: WorkerHealth::Unknown,
                    last_health_check: None,
                    metadata: HashMap::new(),
                })
            })
            .collect()
    }
}
