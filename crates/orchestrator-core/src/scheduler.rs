//! # Scheduler (C6) — the algorithmic heart
//!
//! Advances a workflow: computes the ready set, dispatches assignments,
//! arms timeouts, applies retry policy, and detects termination
//! (spec §4.5). The Scheduler is the sole writer of `StepState` for a
//! given workflow; the Response Correlator never touches step state
//! directly, it only posts events onto an in-process channel this module
//! consumes (spec §9).

use crate::aggregation;
use crate::catalog::WorkflowCatalog;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Assignment, AssignmentStatus, EntityId, RequestError, RequestStatus, StepState, StepStatus,
    Workflow,
};
use crate::registry::WorkerRegistry;
use crate::store::{RequestPatch, RequestStore};
use dashmap::DashMap;
use orchestrator_shared::messaging::{BusPort, TopicRouter};
use orchestrator_shared::resilience::{CircuitBreaker, CircuitBreakerConfig};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::AbortHandle;

/// The outcome of a correlated response, as classified by the Response
/// Correlator (spec §4.7 steps 2-3).
#[derive(Clone)]
pub enum Outcome {
    Success(serde_json::Value),
    Failure(String),
}

/// Events the Scheduler consumes. The Correlator and the admission path
/// both only ever produce these; neither mutates `StepState` directly.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    WorkflowReady { workflow_id: EntityId },
    AssignmentOutcome {
        workflow_id: EntityId,
        assignment_id: EntityId,
        outcome: Outcome,
    },
    AssignmentTimeout {
        workflow_id: EntityId,
        assignment_id: EntityId,
    },
    /// A retryable failure's backoff delay has elapsed; re-promote the step
    /// to `READY` if it is still the one that failed (spec §4.5 "Retry
    /// policy"). Kept distinct from `WorkflowReady` so the `DISPATCHED ->
    /// READY` transition itself is deferred until the delay elapses, not
    /// just the notification.
    RetryStep {
        workflow_id: EntityId,
        step_number: u32,
    },
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => write!(f, "Success"),
            Self::Failure(message) => write!(f, "Failure({message})"),
        }
    }
}

/// Cloneable front door used by the API and the Response Correlator to
/// notify the Scheduler without calling into it directly (spec §9).
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl SchedulerHandle {
    pub fn notify(&self, event: SchedulerEvent) {
        // The receiver only goes away on process shutdown; a dropped event
        // at that point is inconsequential.
        let _ = self.tx.send(event);
    }
}

/// Test-only helper for other modules (the Response Correlator's unit
/// tests) that need a [`SchedulerHandle`] without spinning up a full
/// scheduler event loop.
#[cfg(test)]
pub mod test_support {
    use super::{SchedulerEvent, SchedulerHandle};
    use tokio::sync::mpsc;

    pub fn handle_pair() -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SchedulerHandle { tx }, rx)
    }
}

pub struct Scheduler {
    store: Arc<dyn RequestStore>,
    registry: Arc<WorkerRegistry>,
    bus: Arc<BusPort>,
    topic_router: TopicRouter,
    catalog: Arc<WorkflowCatalog>,
    service_name: String,
    workflow_locks: DashMap<EntityId, Arc<AsyncMutex<()>>>,
    timers: DashMap<EntityId, AbortHandle>,
    handle: SchedulerHandle,
    dispatch_breaker: CircuitBreaker,
    /// Since-when each worker type has had a step stuck `READY` for want of
    /// a healthy instance, cleared the moment dispatch succeeds again
    /// (spec §5 "ready steps accumulate in memory at READY").
    pending_since: DashMap<String, Instant>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl Scheduler {
    /// Build the scheduler and its event loop. Returns the handle other
    /// components use to push events; the scheduler itself keeps running
    /// in a background task for the lifetime of the returned `Arc`.
    pub fn spawn(
        store: Arc<dyn RequestStore>,
        registry: Arc<WorkerRegistry>,
        bus: Arc<BusPort>,
        topic_router: TopicRouter,
        catalog: Arc<WorkflowCatalog>,
        service_name: impl Into<String>,
    ) -> (Arc<Self>, SchedulerHandle) {
        Self::spawn_with_dispatch_breaker_config(
            store,
            registry,
            bus,
            topic_router,
            catalog,
            service_name,
            CircuitBreakerConfig::default(),
        )
    }

    pub fn spawn_with_dispatch_breaker_config(
        store: Arc<dyn RequestStore>,
        registry: Arc<WorkerRegistry>,
        bus: Arc<BusPort>,
        topic_router: TopicRouter,
        catalog: Arc<WorkflowCatalog>,
        service_name: impl Into<String>,
        dispatch_breaker_config: CircuitBreakerConfig,
    ) -> (Arc<Self>, SchedulerHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle { tx };
        let scheduler = Arc::new(Self {
            store,
            registry,
            bus,
            topic_router,
            catalog,
            service_name: service_name.into(),
            workflow_locks: DashMap::new(),
            timers: DashMap::new(),
            handle: handle.clone(),
            dispatch_breaker: CircuitBreaker::new("scheduler.dispatch".to_string(), dispatch_breaker_config),
            pending_since: DashMap::new(),
        });

        let worker = Arc::clone(&scheduler);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(error) = worker.handle_event(event).await {
                    tracing::error!(%error, "scheduler event handling failed");
                }
            }
        });

        (scheduler, handle)
    }

    /// Current state of the dispatch circuit breaker, for `/health`.
    pub fn dispatch_breaker(&self) -> &CircuitBreaker {
        &self.dispatch_breaker
    }

    /// Whether `worker_type` has had a step stuck `READY` for want of a
    /// healthy instance for at least `threshold` (spec §5 "Once saturation
    /// persists longer than a configurable threshold, the API begins
    /// returning 503 ServiceUnavailable for new admissions"). Admission
    /// consults this per worker type a newly routed workflow would need.
    pub fn is_saturated(&self, worker_type: &str, threshold: std::time::Duration) -> bool {
        self.pending_since
            .get(worker_type)
            .map(|since| since.elapsed() >= threshold)
            .unwrap_or(false)
    }

    fn lock_for(&self, workflow_id: EntityId) -> Arc<AsyncMutex<()>> {
        self.workflow_locks
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn handle_event(&self, event: SchedulerEvent) -> CoreResult<()> {
        match event {
            SchedulerEvent::WorkflowReady { workflow_id } => self.advance(workflow_id).await,
            SchedulerEvent::AssignmentOutcome {
                workflow_id,
                assignment_id,
                outcome,
            } => self.apply_outcome(workflow_id, assignment_id, outcome).await,
            SchedulerEvent::AssignmentTimeout {
                workflow_id,
                assignment_id,
            } => self.apply_timeout(workflow_id, assignment_id).await,
            SchedulerEvent::RetryStep {
                workflow_id,
                step_number,
            } => self.retry_step(workflow_id, step_number).await,
        }
    }

    /// Re-read, mutate, write-with-CAS, retrying on `VersionConflict`
    /// (spec §3 "the core never blind-writes").
    async fn with_workflow<F>(&self, workflow_id: EntityId, mut mutate: F) -> CoreResult<Workflow>
    where
        F: FnMut(&mut Workflow) -> CoreResult<()>,
    {
        loop {
            let mut workflow = self
                .store
                .get_workflow(workflow_id)
                .await?
                .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;
            let expected_version = workflow.version;
            mutate(&mut workflow)?;
            match self.store.update_workflow(workflow, expected_version).await {
                Ok(updated) => return Ok(updated),
                Err(CoreError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    /// Advance a workflow: promote `PENDING -> READY` wherever dependencies
    /// are satisfied, dispatch every ready step, and check for terminal
    /// conditions (spec §4.5).
    async fn advance(&self, workflow_id: EntityId) -> CoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        self.advance_locked(workflow_id).await
    }

    /// Body of `advance`, for callers that already hold the per-workflow
    /// lock (`apply_outcome`, `apply_timeout`, `retry_step`) — `advance`
    /// itself must not be called from inside the lock, since
    /// `tokio::sync::Mutex` is not reentrant and a second `.lock().await`
    /// on the same guard deadlocks the scheduler's single event-loop task.
    async fn advance_locked(&self, workflow_id: EntityId) -> CoreResult<()> {
        let workflow = self
            .with_workflow(workflow_id, |workflow| {
                promote_ready_steps(workflow);
                Ok(())
            })
            .await?;

        let ready_steps: Vec<u32> = workflow
            .steps
            .iter()
            .filter(|s| {
                matches!(
                    workflow.state.get(&s.step_number).map(|st| st.status),
                    Some(StepStatus::Ready)
                )
            })
            .map(|s| s.step_number)
            .collect();

        for step_number in ready_steps {
            self.dispatch_step(workflow_id, step_number).await?;
        }

        self.check_termination(workflow_id).await?;
        Ok(())
    }

    /// Dispatch one ready step (spec §4.5 "Dispatch").
    async fn dispatch_step(&self, workflow_id: EntityId, step_number: u32) -> CoreResult<()> {
        if !self.dispatch_breaker.should_allow() {
            tracing::warn!(workflow_id = %workflow_id, step_number, "dispatch circuit breaker open, step remains ready");
            return Ok(());
        }
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;
        let step = workflow
            .step_spec(step_number)
            .ok_or_else(|| CoreError::InvalidWorkflow(format!("unknown step {step_number}")))?
            .clone();

        let Some(worker) = self.registry.select_worker(&step.worker_type) else {
            self.pending_since
                .entry(step.worker_type.clone())
                .or_insert_with(Instant::now);
            tracing::warn!(
                worker_type = %step.worker_type,
                step_number,
                "no worker available, step remains ready for next tick"
            );
            return Ok(());
        };
        self.pending_since.remove(&step.worker_type);

        let request = self
            .store
            .get_request(workflow.request_id)
            .await?
            .ok_or(CoreError::RequestNotFound(workflow.request_id))?;

        let previous_attempts = workflow
            .state
            .get(&step_number)
            .map(|s| s.attempts)
            .unwrap_or(0);
        let attempt = previous_attempts + 1;
        let assignment_id = EntityId::new_v4();
        let now = chrono::Utc::now();
        let deadline_at = now + chrono::Duration::milliseconds(step.timeout_ms as i64);

        let input = build_step_input(&workflow, &request.payload, step_number);
        tracing::debug!(
            workflow_id = %workflow_id,
            step_number,
            worker_type = %step.worker_type,
            input = %orchestrator_shared::redaction::redact_for_logging(&input),
            "dispatching step"
        );

        let assignment = Assignment {
            id: assignment_id,
            request_id: workflow.request_id,
            workflow_id,
            step_number,
            worker_type: step.worker_type.clone(),
            worker_instance_id: Some(worker.id.clone()),
            attempt,
            status: AssignmentStatus::Dispatched,
            dispatched_at: now,
            completed_at: None,
            deadline_at,
            input: input.clone(),
            output: None,
            error: None,
            late: false,
            version: 0,
        };
        self.store.create_assignment(assignment).await?;

        let topic = self.topic_router.task_topic(&step.worker_type);
        let headers = self
            .bus
            .headers(now.timestamp_millis())
            .with_request_id(workflow.request_id.to_string())
            .with_correlation_id(request.correlation_id.clone())
            .with_user_id(request.user_id.clone())
            .with_assignment_id(assignment_id.to_string());
        let body = serde_json::json!({
            "requestId": workflow.request_id,
            "assignmentId": assignment_id,
            "stepNumber": step_number,
            "workerType": step.worker_type,
            "payload": input,
            "deadlineAt": deadline_at,
        });

        // Dispatch errors (bus down) are absorbed: the step stays READY and
        // the next scheduling tick retries (spec §4.1, §7).
        let started = Instant::now();
        if let Err(error) = self.bus.publish(&topic, body, headers).await {
            self.dispatch_breaker.record_failure_manual(started.elapsed());
            tracing::warn!(%error, topic, "dispatch publish failed, step remains ready");
            return Ok(());
        }
        self.dispatch_breaker.record_success_manual(started.elapsed());

        self.with_workflow(workflow_id, |workflow| {
            if let Some(state) = workflow.state.get_mut(&step_number) {
                state.status = StepStatus::Dispatched;
                state.attempts = attempt;
                state.last_assignment_id = Some(assignment_id);
                state.started_at.get_or_insert(now);
            }
            Ok(())
        })
        .await?;

        self.arm_timeout(workflow_id, assignment_id, deadline_at);
        Ok(())
    }

    fn arm_timeout(
        &self,
        workflow_id: EntityId,
        assignment_id: EntityId,
        deadline_at: chrono::DateTime<chrono::Utc>,
    ) {
        let duration = (deadline_at - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let this = self.self_handle();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            this.notify(SchedulerEvent::AssignmentTimeout {
                workflow_id,
                assignment_id,
            });
        });
        self.timers.insert(assignment_id, task.abort_handle());
    }

    fn cancel_timeout(&self, assignment_id: EntityId) {
        if let Some((_, handle)) = self.timers.remove(&assignment_id) {
            handle.abort();
        }
    }

    /// The scheduler re-derives its own handle to arm timeouts without
    /// threading one through every call site; the channel is cheap to
    /// clone and the receiver lives for the process lifetime.
    fn self_handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Apply a correlated response (spec §4.5 `DISPATCHED -> SUCCEEDED|FAILED|READY`,
    /// spec §4.7 step 4, spec §8 invariant 8 "late responses never retro-advance").
    async fn apply_outcome(
        &self,
        workflow_id: EntityId,
        assignment_id: EntityId,
        outcome: Outcome,
    ) -> CoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let Some(mut assignment) = self.store.get_assignment(assignment_id).await? else {
            tracing::warn!(%assignment_id, "response for unknown assignment, dropping");
            return Ok(());
        };

        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;
        let step_number = assignment.step_number;
        let step_still_dispatched = matches!(
            workflow.state.get(&step_number).map(|s| s.status),
            Some(StepStatus::Dispatched)
        ) && workflow
            .state
            .get(&step_number)
            .and_then(|s| s.last_assignment_id)
            == Some(assignment_id);

        self.cancel_timeout(assignment_id);

        let now = chrono::Utc::now();
        assignment.completed_at = Some(now);
        let expected_version = assignment.version;

        if !step_still_dispatched {
            // Late response: update the assignment record but never
            // retro-advance step state (spec §4.5, §8 invariant 8).
            assignment.status = AssignmentStatus::Succeeded;
            assignment.late = true;
            if let Outcome::Success(output) = &outcome {
                assignment.output = Some(output.clone());
            }
            self.store.update_assignment(assignment, expected_version).await?;
            return Ok(());
        }

        match outcome {
            Outcome::Success(output) => {
                assignment.status = AssignmentStatus::Succeeded;
                assignment.output = Some(output.clone());
                self.store.update_assignment(assignment, expected_version).await?;

                self.with_workflow(workflow_id, |workflow| {
                    if let Some(state) = workflow.state.get_mut(&step_number) {
                        state.status = StepStatus::Succeeded;
                        state.output = Some(output.clone());
                        state.finished_at = Some(now);
                    }
                    Ok(())
                })
                .await?;
            }
            Outcome::Failure(message) => {
                assignment.status = AssignmentStatus::Failed;
                assignment.error = Some(message.clone());
                self.store.update_assignment(assignment, expected_version).await?;
                self.fail_or_retry_step(workflow_id, step_number, message).await?;
            }
        }

        self.advance_locked(workflow_id).await?;
        Ok(())
    }

    /// On timeout, mark the assignment `TIMED_OUT` and treat it as a
    /// failure with retry consultation (spec §4.5 "Timeouts").
    async fn apply_timeout(&self, workflow_id: EntityId, assignment_id: EntityId) -> CoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let Some(mut assignment) = self.store.get_assignment(assignment_id).await? else {
            return Ok(());
        };
        if assignment.status != AssignmentStatus::Dispatched {
            // Response already arrived and resolved this assignment.
            return Ok(());
        }

        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;
        let step_number = assignment.step_number;
        let step_still_dispatched = matches!(
            workflow.state.get(&step_number).map(|s| s.status),
            Some(StepStatus::Dispatched)
        ) && workflow
            .state
            .get(&step_number)
            .and_then(|s| s.last_assignment_id)
            == Some(assignment_id);

        let expected_version = assignment.version;
        assignment.status = AssignmentStatus::TimedOut;
        assignment.completed_at = Some(chrono::Utc::now());
        self.store.update_assignment(assignment, expected_version).await?;

        if !step_still_dispatched {
            return Ok(());
        }

        self.fail_or_retry_step(workflow_id, step_number, "assignment timed out".to_string())
            .await?;
        self.advance_locked(workflow_id).await
    }

    /// Shared tail of a worker-error or timeout: consult the step's retry
    /// policy and either reset to `READY` after a backoff delay or mark
    /// the step terminally `FAILED` (spec §4.5 "Retry policy").
    async fn fail_or_retry_step(
        &self,
        workflow_id: EntityId,
        step_number: u32,
        error_message: String,
    ) -> CoreResult<()> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;
        let step = workflow
            .step_spec(step_number)
            .ok_or_else(|| CoreError::InvalidWorkflow(format!("unknown step {step_number}")))?
            .clone();
        let attempts = workflow
            .state
            .get(&step_number)
            .map(|s| s.attempts)
            .unwrap_or(0);

        if attempts < step.retry_policy.max_attempts {
            let delay = step.retry_policy.backoff_for_attempt(attempts);
            // The step stays `DISPATCHED` through the backoff window; only
            // the error is recorded now. The `DISPATCHED -> READY` reset
            // itself happens in `retry_step`, once the delay has actually
            // elapsed (spec §4.5 "schedule re-entry of the step to READY
            // after that delay").
            self.with_workflow(workflow_id, |workflow| {
                if let Some(state) = workflow.state.get_mut(&step_number) {
                    state.error = Some(error_message.clone());
                }
                Ok(())
            })
            .await?;

            if delay > std::time::Duration::ZERO {
                let handle = self.self_handle();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    handle.notify(SchedulerEvent::RetryStep { workflow_id, step_number });
                });
            } else {
                self.self_handle()
                    .notify(SchedulerEvent::RetryStep { workflow_id, step_number });
            }
            return Ok(());
        }

        // Attempts exhausted: step is terminally failed, transitive
        // dependents are skipped (spec §4.5 "FAILED -> SKIPPED").
        self.with_workflow(workflow_id, |workflow| {
            if let Some(state) = workflow.state.get_mut(&step_number) {
                state.status = StepStatus::Failed;
                state.error = Some(error_message.clone());
                state.finished_at = Some(chrono::Utc::now());
            }
            skip_transitive_dependents(workflow, step_number);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// A retry's backoff delay has elapsed: reset the step to `READY` if
    /// (and only if) it is still `DISPATCHED` — a late response may have
    /// already resolved it while the delay was running, in which case the
    /// reset must not happen (spec §8 invariant 8).
    async fn retry_step(&self, workflow_id: EntityId, step_number: u32) -> CoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        self.with_workflow(workflow_id, |workflow| {
            if let Some(state) = workflow.state.get_mut(&step_number) {
                if state.status == StepStatus::Dispatched {
                    state.status = StepStatus::Ready;
                }
            }
            Ok(())
        })
        .await?;

        self.advance_locked(workflow_id).await
    }

    /// Detect `COMPLETED` / `FAILED` termination and finalize the request
    /// (spec §4.5 "Termination").
    async fn check_termination(&self, workflow_id: EntityId) -> CoreResult<()> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id))?;

        if workflow.all_succeeded() {
            let template = self.catalog.get(&workflow.template_name);
            let result = aggregation::aggregate(&workflow, template);
            self.finalize_request(
                workflow.request_id,
                RequestStatus::Completed,
                Some(result),
                None,
            )
            .await?;
            return Ok(());
        }

        if let Some(failed_step) = workflow.any_terminal_failed() {
            let still_in_flight = workflow.steps.iter().any(|s| {
                matches!(
                    workflow.state.get(&s.step_number).map(|st| st.status),
                    Some(StepStatus::Dispatched)
                )
            });
            if still_in_flight {
                return Ok(());
            }
            let partial = aggregation::partial(&workflow);
            let mut result = serde_json::Map::new();
            result.insert("partial".to_string(), partial);
            let error = RequestError {
                code: "STEP_FAILED".to_string(),
                message: format!("step {failed_step} failed terminally"),
                failed_step: Some(failed_step),
            };
            self.finalize_request(
                workflow.request_id,
                RequestStatus::Failed,
                Some(serde_json::Value::Object(result)),
                Some(error),
            )
            .await?;
        }
        Ok(())
    }

    async fn finalize_request(
        &self,
        request_id: EntityId,
        status: RequestStatus,
        result: Option<serde_json::Value>,
        error: Option<RequestError>,
    ) -> CoreResult<()> {
        loop {
            let request = self
                .store
                .get_request(request_id)
                .await?
                .ok_or(CoreError::RequestNotFound(request_id))?;
            if matches!(
                request.status,
                RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
            ) {
                return Ok(());
            }
            let expected_version = request.version;
            let patch = RequestPatch {
                status: Some(status),
                result: result.clone(),
                error: error.clone(),
                completed_at: Some(chrono::Utc::now()),
            };
            match self.store.update_request(request_id, patch, expected_version).await {
                Ok(_) => return Ok(()),
                Err(CoreError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }
}

/// `PENDING -> READY` wherever every dependency has `SUCCEEDED`, including
/// steps with an empty `dependsOn` (spec §4.5 "Ready-set computation").
fn promote_ready_steps(workflow: &mut Workflow) {
    let deps: Vec<(u32, Vec<u32>)> = workflow
        .steps
        .iter()
        .map(|s| (s.step_number, s.depends_on.clone()))
        .collect();
    for (step_number, depends_on) in deps {
        let is_pending = matches!(
            workflow.state.get(&step_number).map(|s| s.status),
            Some(StepStatus::Pending)
        );
        if !is_pending {
            continue;
        }
        let all_succeeded = depends_on.iter().all(|dep| {
            matches!(
                workflow.state.get(dep).map(|s| s.status),
                Some(StepStatus::Succeeded)
            )
        });
        if all_succeeded {
            if let Some(state) = workflow.state.get_mut(&step_number) {
                state.status = StepStatus::Ready;
            }
        }
    }
}

/// Mark every transitive dependent of `failed_step` as `SKIPPED`
/// (spec §4.5).
fn skip_transitive_dependents(workflow: &mut Workflow, failed_step: u32) {
    let mut frontier = vec![failed_step];
    let mut skipped = std::collections::HashSet::new();
    while let Some(step_number) = frontier.pop() {
        for dependent in workflow.dependents_of(step_number) {
            if skipped.insert(dependent) {
                if let Some(state) = workflow.state.get_mut(&dependent) {
                    if !matches!(
                        state.status,
                        StepStatus::Succeeded | StepStatus::Failed
                    ) {
                        state.status = StepStatus::Skipped;
                        state.finished_at = Some(chrono::Utc::now());
                    }
                }
                frontier.push(dependent);
            }
        }
    }
}

/// Step input: the request's original payload merged with the accumulated
/// outputs of its dependency steps (spec §4.5 "Route the task").
fn build_step_input(
    workflow: &Workflow,
    request_payload: &serde_json::Value,
    step_number: u32,
) -> serde_json::Value {
    let mut merged = request_payload.clone();
    let Some(step) = workflow.step_spec(step_number) else {
        return merged;
    };
    if let serde_json::Value::Object(map) = &mut merged {
        for dep in &step.depends_on {
            if let Some(output) = workflow.state.get(dep).and_then(|s| s.output.clone()) {
                map.insert(format!("step{dep}Output"), output);
            }
        }
    }
    merged
}

impl Scheduler {
    /// Build the initial `Workflow` for a template + payload, resolving
    /// the `single-worker` passthrough's worker type from the payload
    /// (spec §4.4).
    pub fn instantiate_workflow(
        catalog: &WorkflowCatalog,
        template_name: &str,
        request_id: EntityId,
        payload: &serde_json::Value,
    ) -> CoreResult<Workflow> {
        let template = catalog
            .get(template_name)
            .ok_or_else(|| CoreError::UnknownWorkflow(template_name.to_string()))?;

        let mut steps = template.steps.clone();
        if template_name == crate::catalog::SINGLE_WORKER {
            let worker_type = payload
                .get("workerType")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    CoreError::InvalidWorkflow(
                        "single-worker template requires payload.workerType".to_string(),
                    )
                })?;
            steps[0].worker_type = worker_type.to_string();
        }

        let step_numbers: std::collections::HashSet<u32> =
            steps.iter().map(|s| s.step_number).collect();
        for step in &steps {
            for dep in &step.depends_on {
                if !step_numbers.contains(dep) {
                    return Err(CoreError::InvalidWorkflow(format!(
                        "step {} depends on unknown step {}",
                        step.step_number, dep
                    )));
                }
            }
        }

        let mut state = std::collections::HashMap::new();
        for step in &steps {
            state.insert(step.step_number, StepState::pending());
        }

        Ok(Workflow {
            id: EntityId::new_v4(),
            request_id,
            template_name: template_name.to_string(),
            steps,
            current_step: 0,
            state,
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RetryPolicy, StepSpec};

    fn workflow_with_steps(steps: Vec<StepSpec>) -> Workflow {
        let mut state = std::collections::HashMap::new();
        for step in &steps {
            state.insert(step.step_number, StepState::pending());
        }
        Workflow {
            id: EntityId::new_v4(),
            request_id: EntityId::new_v4(),
            template_name: "test".to_string(),
            steps,
            current_step: 0,
            state,
            version: 0,
        }
    }

    #[test]
    fn promotes_steps_with_no_dependencies() {
        let mut workflow = workflow_with_steps(vec![StepSpec {
            step_number: 1,
            worker_type: "llm".to_string(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 1000,
            retry_policy: RetryPolicy::default(),
        }]);
        promote_ready_steps(&mut workflow);
        assert_eq!(workflow.state[&1].status, StepStatus::Ready);
    }

    #[test]
    fn does_not_promote_step_with_unsatisfied_dependency() {
        let mut workflow = workflow_with_steps(vec![
            StepSpec {
                step_number: 1,
                worker_type: "a".to_string(),
                depends_on: vec![],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
            StepSpec {
                step_number: 2,
                worker_type: "b".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
        ]);
        promote_ready_steps(&mut workflow);
        assert_eq!(workflow.state[&1].status, StepStatus::Ready);
        assert_eq!(workflow.state[&2].status, StepStatus::Pending);
    }

    #[test]
    fn promotes_step_once_dependency_succeeds() {
        let mut workflow = workflow_with_steps(vec![
            StepSpec {
                step_number: 1,
                worker_type: "a".to_string(),
                depends_on: vec![],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
            StepSpec {
                step_number: 2,
                worker_type: "b".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
        ]);
        workflow.state.get_mut(&1).unwrap().status = StepStatus::Succeeded;
        promote_ready_steps(&mut workflow);
        assert_eq!(workflow.state[&2].status, StepStatus::Ready);
    }

    #[test]
    fn skip_transitive_dependents_marks_descendants() {
        let mut workflow = workflow_with_steps(vec![
            StepSpec {
                step_number: 1,
                worker_type: "a".to_string(),
                depends_on: vec![],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
            StepSpec {
                step_number: 2,
                worker_type: "b".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
            StepSpec {
                step_number: 3,
                worker_type: "c".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 1000,
                retry_policy: RetryPolicy::default(),
            },
        ]);
        workflow.state.get_mut(&1).unwrap().status = StepStatus::Failed;
        skip_transitive_dependents(&mut workflow, 1);
        assert_eq!(workflow.state[&2].status, StepStatus::Skipped);
        assert_eq!(workflow.state[&3].status, StepStatus::Skipped);
    }

    #[test]
    fn instantiate_single_worker_resolves_type_from_payload() {
        let catalog = WorkflowCatalog::with_builtin_templates();
        let workflow = Scheduler::instantiate_workflow(
            &catalog,
            crate::catalog::SINGLE_WORKER,
            EntityId::new_v4(),
            &serde_json::json!({"workerType": "llm"}),
        )
        .unwrap();
        assert_eq!(workflow.steps[0].worker_type, "llm");
    }

    #[test]
    fn instantiate_single_worker_without_type_is_invalid() {
        let catalog = WorkflowCatalog::with_builtin_templates();
        let err = Scheduler::instantiate_workflow(
            &catalog,
            crate::catalog::SINGLE_WORKER,
            EntityId::new_v4(),
            &serde_json::json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkflow(_)));
    }
}
