//! # Orchestration Bootstrap
//!
//! Wires the Bus Port, Worker Registry, Request Store, Workflow Catalog,
//! Scheduler, and Response Correlator into a running system, and exposes
//! the handful of operations the Orchestration API needs: admit a
//! request, read a request's current view.

use crate::catalog::WorkflowCatalog;
use crate::correlator::ResponseCorrelator;
use crate::error::{CoreError, CoreResult};
use crate::model::{EntityId, Request, RequestStatus};
use crate::registry::{DiscoveryBackend, HttpClusterDiscoveryClient, StaticDiscoveryClient, WorkerRegistry};
use crate::router::Router;
use crate::scheduler::{Scheduler, SchedulerEvent, SchedulerHandle};
use crate::store::{InMemoryStore, RequestStore};
use orchestrator_shared::config::{OrchestratorConfig, WorkerDiscoveryMode};
use orchestrator_shared::messaging::{BusPort, MessagingBackend, TopicRouter};
use std::sync::Arc;

/// A request's current view, as returned by `GET /orchestrate/{id}`
/// (spec §4.8).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestView {
    pub request_id: EntityId,
    pub status: RequestStatus,
    pub workflow_name: String,
    pub steps: Vec<StepView>,
    pub result: Option<serde_json::Value>,
    pub error: Option<crate::model::RequestError>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StepView {
    pub step_number: u32,
    pub status: crate::model::StepStatus,
    pub attempts: u32,
}

/// The outcome of admitting a request (spec §4.8).
#[derive(Debug, Clone)]
pub struct Admission {
    pub request_id: EntityId,
    pub status: RequestStatus,
    pub estimated_duration_ms: u64,
    pub newly_created: bool,
}

pub struct OrchestrationCore {
    pub store: Arc<dyn RequestStore>,
    pub registry: Arc<WorkerRegistry>,
    pub bus: Arc<BusPort>,
    pub catalog: Arc<WorkflowCatalog>,
    pub scheduler: Arc<Scheduler>,
    pub scheduler_handle: SchedulerHandle,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for OrchestrationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCore")
            .field("service_name", &self.config.service_name)
            .finish()
    }
}

impl OrchestrationCore {
    /// Build every component and start the scheduler event loop, the bus
    /// consumer, the registry discovery loop, and the health-check loop.
    /// Uses the in-memory store; production deployments swap `store` via
    /// [`OrchestrationCore::with_store`].
    pub async fn bootstrap(config: OrchestratorConfig) -> CoreResult<Arc<Self>> {
        Self::with_store(config, Arc::new(InMemoryStore::new())).await
    }

    pub async fn with_store(
        config: OrchestratorConfig,
        store: Arc<dyn RequestStore>,
    ) -> CoreResult<Arc<Self>> {
        Self::with_parts(
            config,
            store,
            Arc::new(WorkflowCatalog::with_builtin_templates()),
        )
        .await
    }

    /// Full constructor taking an explicit catalog, for test harnesses that
    /// need scenario-specific templates (timeouts, retry policies) the
    /// builtin catalog doesn't carry.
    pub async fn with_parts(
        config: OrchestratorConfig,
        store: Arc<dyn RequestStore>,
        catalog: Arc<WorkflowCatalog>,
    ) -> CoreResult<Arc<Self>> {
        let backend = if config.bus.uses_in_memory() {
            MessagingBackend::in_memory()
        } else {
            MessagingBackend::amqp(config.bus.brokers.clone())
        };
        let bus = Arc::new(
            BusPort::with_circuit_breaker_config(
                config.service_name.clone(),
                backend,
                config.circuit_breakers.messaging.to_resilience_config(),
            )
            .with_reconnect_interval(config.bus.reconnect_interval),
        );
        bus.connect()
            .await
            .map_err(|e| CoreError::Fatal(format!("bus port failed to start: {e}")))?;

        let discovery_backend = match config.registry.discovery_mode {
            WorkerDiscoveryMode::Static => {
                DiscoveryBackend::Static(StaticDiscoveryClient::new(config.registry.clone()))
            }
            WorkerDiscoveryMode::Kubernetes => DiscoveryBackend::Cluster(
                HttpClusterDiscoveryClient::with_circuit_breaker_config(
                    "http://cluster-orchestrator".to_string(),
                    config.circuit_breakers.registry_discovery.to_resilience_config(),
                ),
            ),
        };
        let registry = Arc::new(WorkerRegistry::new(discovery_backend, config.registry.clone()));
        registry.spawn_discovery_loop(catalog.worker_types());
        registry.spawn_health_check_loop();

        let topic_router = TopicRouter::new(orchestrator_shared::messaging::ResponseTopicConfig::default());

        let (scheduler, scheduler_handle) = Scheduler::spawn_with_dispatch_breaker_config(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&bus),
            topic_router.clone(),
            Arc::clone(&catalog),
            config.service_name.clone(),
            config.circuit_breakers.dispatch.to_resilience_config(),
        );

        let correlator = Arc::new(ResponseCorrelator::new(Arc::clone(&store), scheduler_handle.clone()));
        for topic in topic_router.all_response_topics(&catalog.worker_types()) {
            bus.subscribe(&topic, correlator.clone())
                .map_err(|e| CoreError::Fatal(format!("failed to subscribe to {topic}: {e}")))?;
        }
        bus.start_consumer();

        Ok(Arc::new(Self {
            store,
            registry,
            bus,
            catalog,
            scheduler,
            scheduler_handle,
            config,
        }))
    }

    /// `POST /orchestrate` (spec §4.8): idempotent admission.
    pub async fn admit(
        &self,
        user_id: &str,
        workflow_name: Option<&str>,
        payload: serde_json::Value,
        correlation_id: Option<String>,
        idempotency_key: Option<String>,
    ) -> CoreResult<Admission> {
        let router = Router::new(&self.catalog);
        let template_name = router.route(workflow_name, &payload)?;
        let template = self
            .catalog
            .get(&template_name)
            .expect("router only returns names the catalog knows");

        // Idempotent admission (spec §3, §4.8): the same (userId,
        // idempotencyKey) must return the existing request. If the key is
        // reused with a materially different workflow or payload, that is
        // a genuine conflict, not a replay (spec §6 "409 idempotency
        // conflict").
        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency(user_id, key).await? {
                if existing.workflow_name != template_name || existing.payload != payload {
                    return Err(CoreError::IdempotencyConflict {
                        user_id: user_id.to_string(),
                        key: key.clone(),
                    });
                }
                let existing_template = self.catalog.get(&existing.workflow_name);
                return Ok(Admission {
                    request_id: existing.id,
                    status: existing.status,
                    estimated_duration_ms: existing_template
                        .map(|t| t.estimated_duration_ms)
                        .unwrap_or(0),
                    newly_created: false,
                });
            }
        }

        let request_id = EntityId::new_v4();
        let workflow = Scheduler::instantiate_workflow(&self.catalog, &template_name, request_id, &payload)?;

        let threshold = std::time::Duration::from_millis(self.config.saturation_threshold_ms);
        for step in &workflow.steps {
            if self.scheduler.is_saturated(&step.worker_type, threshold) {
                return Err(CoreError::Saturated(step.worker_type.clone()));
            }
        }

        let now = chrono::Utc::now();
        let request = Request {
            id: request_id,
            user_id: user_id.to_string(),
            workflow_name: template_name.clone(),
            payload,
            correlation_id: correlation_id.unwrap_or_else(|| request_id.to_string()),
            idempotency_key,
            status: RequestStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            workflow_id: workflow.id,
            version: 0,
        };
        let workflow_id = workflow.id;
        self.store.create_request(request, workflow).await?;

        self.scheduler_handle
            .notify(SchedulerEvent::WorkflowReady { workflow_id });

        Ok(Admission {
            request_id,
            status: RequestStatus::Running,
            estimated_duration_ms: template.estimated_duration_ms,
            newly_created: true,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// `GET /orchestrate/{id}` (spec §4.8).
    pub async fn get_request_view(&self, request_id: EntityId) -> CoreResult<Option<RequestView>> {
        let Some(request) = self.store.get_request(request_id).await? else {
            return Ok(None);
        };
        let workflow = self.store.get_workflow(request.workflow_id).await?;
        let steps = workflow
            .map(|w| {
                w.steps
                    .iter()
                    .map(|s| StepView {
                        step_number: s.step_number,
                        status: w
                            .state
                            .get(&s.step_number)
                            .map(|st| st.status)
                            .unwrap_or(crate::model::StepStatus::Pending),
                        attempts: w.state.get(&s.step_number).map(|st| st.attempts).unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(RequestView {
            request_id: request.id,
            status: request.status,
            workflow_name: request.workflow_name,
            steps,
            result: request.result,
            error: request.error,
            created_at: request.created_at,
            updated_at: request.updated_at,
            completed_at: request.completed_at,
        }))
    }
}
