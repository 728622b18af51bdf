//! # Domain Model
//!
//! `Request` / `Workflow` / `Assignment` / `WorkerInstance` and their
//! supporting enums. Every state-carrying struct is plain data; the
//! behavior that mutates it lives in the Scheduler, Store, and Registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type EntityId = Uuid;

/// Top-level request status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Terminal error surfaced on a failed or cancelled request (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestError {
    pub code: String,
    pub message: String,
    pub failed_step: Option<u32>,
}

/// The caller's unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: EntityId,
    pub user_id: String,
    pub workflow_name: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub idempotency_key: Option<String>,
    pub status: RequestStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<RequestError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow_id: EntityId,
    pub version: u64,
}

/// Step status in the per-step state machine (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Ready,
    Dispatched,
    Succeeded,
    Failed,
    Skipped,
}

/// Retry policy for a single step (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            exponential: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-entering `READY` after a retryable failure on
    /// `attempt` (1-based), per spec §4.5: `backoffMs * (2^(attempt-1))`
    /// when `exponential`, else a flat `backoffMs`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let millis = if self.exponential {
            self.backoff_ms.saturating_mul(1u64 << attempt.saturating_sub(1))
        } else {
            self.backoff_ms
        };
        std::time::Duration::from_millis(millis)
    }
}

/// A single node in a workflow's step graph (template definition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub step_number: u32,
    pub worker_type: String,
    pub depends_on: Vec<u32>,
    pub parallel: bool,
    pub timeout_ms: u64,
    pub retry_policy: RetryPolicy,
}

/// Runtime state for one step of an instantiated workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepStatus,
    pub attempts: u32,
    pub last_assignment_id: Option<EntityId>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepState {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            attempts: 0,
            last_assignment_id: None,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// An instance of a template bound to a Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: EntityId,
    pub request_id: EntityId,
    pub template_name: String,
    pub steps: Vec<StepSpec>,
    pub current_step: u32,
    pub state: HashMap<u32, StepState>,
    pub version: u64,
}

impl Workflow {
    pub fn step_spec(&self, step_number: u32) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    pub fn dependents_of(&self, step_number: u32) -> Vec<u32> {
        self.steps
            .iter()
            .filter(|s| s.depends_on.contains(&step_number))
            .map(|s| s.step_number)
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(self.state.get(&s.step_number).map(|st| st.status), Some(StepStatus::Succeeded)))
    }

    pub fn any_terminal_failed(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| matches!(self.state.get(&s.step_number).map(|st| st.status), Some(StepStatus::Failed)))
            .map(|s| s.step_number)
    }
}

/// Assignment status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Dispatched,
    Succeeded,
    Failed,
    TimedOut,
}

/// A single dispatched attempt for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: EntityId,
    pub request_id: EntityId,
    pub workflow_id: EntityId,
    pub step_number: u32,
    pub worker_type: String,
    pub worker_instance_id: Option<String>,
    pub attempt: u32,
    pub status: AssignmentStatus,
    pub dispatched_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline_at: DateTime<Utc>,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set when a response arrives after the owning step has already left
    /// `DISPATCHED` (spec §4.5 "late response"): the assignment record is
    /// still updated, but step state is never retro-advanced.
    pub late: bool,
    pub version: u64,
}

/// Worker instance health as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

/// A discovered worker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstance {
    pub id: String,
    pub worker_type: String,
    pub endpoint: String,
    pub health: WorkerHealth,
    pub last_health_check: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}
