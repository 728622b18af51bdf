//! In-memory `RequestStore` reference implementation.

use super::{RequestPatch, RequestStore};
use crate::error::{CoreError, CoreResult};
use crate::model::{Assignment, EntityId, Request, Workflow};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStore {
    requests: DashMap<EntityId, Request>,
    workflows: DashMap<EntityId, Workflow>,
    workflow_by_request: DashMap<EntityId, EntityId>,
    assignments: DashMap<EntityId, Assignment>,
    // (user_id, idempotency_key) -> request id. A plain Mutex<HashMap> is
    // fine here: it's only touched on admission, never on the hot path.
    idempotency_index: Mutex<HashMap<(String, String), EntityId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn create_request(&self, request: Request, workflow: Workflow) -> CoreResult<()> {
        if let Some(key) = request.idempotency_key.clone() {
            let mut index = self.idempotency_index.lock().expect("idempotency index poisoned");
            index
                .entry((request.user_id.clone(), key))
                .or_insert(request.id);
        }
        self.workflow_by_request.insert(request.id, workflow.id);
        self.workflows.insert(workflow.id, workflow);
        self.requests.insert(request.id, request);
        Ok(())
    }

    async fn get_request(&self, id: EntityId) -> CoreResult<Option<Request>> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    async fn find_by_idempotency(&self, user_id: &str, key: &str) -> CoreResult<Option<Request>> {
        let request_id = {
            let index = self.idempotency_index.lock().expect("idempotency index poisoned");
            index.get(&(user_id.to_string(), key.to_string())).copied()
        };
        match request_id {
            Some(id) => self.get_request(id).await,
            None => Ok(None),
        }
    }

    async fn update_request(
        &self,
        id: EntityId,
        patch: RequestPatch,
        expected_version: u64,
    ) -> CoreResult<Request> {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or(CoreError::RequestNotFound(id))?;
        if entry.version != expected_version {
            return Err(CoreError::VersionConflict { id });
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(result) = patch.result {
            entry.result = Some(result);
        }
        if let Some(error) = patch.error {
            entry.error = Some(error);
        }
        if let Some(completed_at) = patch.completed_at {
            entry.completed_at = Some(completed_at);
        }
        entry.updated_at = chrono::Utc::now();
        entry.version += 1;
        Ok(entry.clone())
    }

    async fn get_workflow(&self, id: EntityId) -> CoreResult<Option<Workflow>> {
        Ok(self.workflows.get(&id).map(|w| w.clone()))
    }

    async fn get_workflow_by_request(&self, request_id: EntityId) -> CoreResult<Option<Workflow>> {
        match self.workflow_by_request.get(&request_id) {
            Some(workflow_id) => self.get_workflow(*workflow_id).await,
            None => Ok(None),
        }
    }

    async fn update_workflow(&self, workflow: Workflow, expected_version: u64) -> CoreResult<Workflow> {
        let mut entry = self
            .workflows
            .get_mut(&workflow.id)
            .ok_or(CoreError::VersionConflict { id: workflow.id })?;
        if entry.version != expected_version {
            return Err(CoreError::VersionConflict { id: workflow.id });
        }
        let mut updated = workflow;
        updated.version = expected_version + 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn create_assignment(&self, assignment: Assignment) -> CoreResult<()> {
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn get_assignment(&self, id: EntityId) -> CoreResult<Option<Assignment>> {
        Ok(self.assignments.get(&id).map(|a| a.clone()))
    }

    async fn update_assignment(&self, assignment: Assignment, expected_version: u64) -> CoreResult<Assignment> {
        let mut entry = self
            .assignments
            .get_mut(&assignment.id)
            .ok_or(CoreError::VersionConflict { id: assignment.id })?;
        if entry.version != expected_version {
            return Err(CoreError::VersionConflict { id: assignment.id });
        }
        let mut updated = assignment;
        updated.version = expected_version + 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn assignments_for_step(
        &self,
        workflow_id: EntityId,
        step_number: u32,
    ) -> CoreResult<Vec<Assignment>> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| a.workflow_id == workflow_id && a.step_number == step_number)
            .map(|a| a.clone())
            .collect())
    }
}
