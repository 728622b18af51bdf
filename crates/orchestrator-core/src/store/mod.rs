//! # Request Store (C3)
//!
//! Durable CRUD for Request, Workflow, and Assignment with conditional
//! (compare-and-set) updates keyed by a monotonic `version` field. A
//! storage-agnostic trait plus an in-memory reference implementation used
//! by every test in this workspace (spec §4.3: "a reference implementation
//! is in-memory").

mod memory;

pub use memory::InMemoryStore;

use crate::error::CoreResult;
use crate::model::{Assignment, EntityId, Request, Workflow};
use async_trait::async_trait;

/// Patch applied to a Request on update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub status: Option<crate::model::RequestStatus>,
    pub result: Option<serde_json::Value>,
    pub error: Option<crate::model::RequestError>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create_request(&self, request: Request, workflow: Workflow) -> CoreResult<()>;
    async fn get_request(&self, id: EntityId) -> CoreResult<Option<Request>>;
    async fn find_by_idempotency(&self, user_id: &str, key: &str) -> CoreResult<Option<Request>>;
    async fn update_request(
        &self,
        id: EntityId,
        patch: RequestPatch,
        expected_version: u64,
    ) -> CoreResult<Request>;

    async fn get_workflow(&self, id: EntityId) -> CoreResult<Option<Workflow>>;
    async fn get_workflow_by_request(&self, request_id: EntityId) -> CoreResult<Option<Workflow>>;
    /// Replace the entire workflow under a version guard. The scheduler is
    /// the sole writer of `StepState`, so the whole mutable surface moves
    /// atomically rather than via field-level patches.
    async fn update_workflow(&self, workflow: Workflow, expected_version: u64) -> CoreResult<Workflow>;

    async fn create_assignment(&self, assignment: Assignment) -> CoreResult<()>;
    async fn get_assignment(&self, id: EntityId) -> CoreResult<Option<Assignment>>;
    async fn update_assignment(&self, assignment: Assignment, expected_version: u64) -> CoreResult<Assignment>;
    async fn assignments_for_step(
        &self,
        workflow_id: EntityId,
        step_number: u32,
    ) -> CoreResult<Vec<Assignment>>;
}
