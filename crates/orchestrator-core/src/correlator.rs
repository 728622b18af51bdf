//! # Response Correlator (C7)
//!
//! Subscribes to the union of worker response topics and maps each message
//! to an in-flight assignment, emitting a [`SchedulerEvent`] rather than
//! mutating workflow state directly (spec §4.7, §9).

use crate::scheduler::{Outcome, SchedulerEvent, SchedulerHandle};
use crate::store::RequestStore;
use async_trait::async_trait;
use orchestrator_shared::messaging::MessageHandler;
use std::sync::Arc;
use uuid::Uuid;

pub struct ResponseCorrelator {
    store: Arc<dyn RequestStore>,
    scheduler: SchedulerHandle,
}

impl ResponseCorrelator {
    pub fn new(store: Arc<dyn RequestStore>, scheduler: SchedulerHandle) -> Self {
        Self { store, scheduler }
    }
}

#[async_trait]
impl MessageHandler for ResponseCorrelator {
    async fn handle(&self, topic: &str, body: serde_json::Value) {
        if let Err(reason) = self.process(body).await {
            tracing::warn!(topic, reason, "dropping undeliverable response");
        }
    }
}

impl ResponseCorrelator {
    /// Processing per spec §4.7 steps 1-3. Returns `Err(reason)` for the
    /// "log warn, drop" paths; the caller logs with the topic attached.
    async fn process(&self, body: serde_json::Value) -> Result<(), &'static str> {
        let assignment_id = body
            .get("assignmentId")
            .or_else(|| body.get("taskId"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let Some(assignment_id) = assignment_id else {
            return Err("missing assignmentId/taskId");
        };

        // requestId is carried for external tracing and cross-checking,
        // but the assignment id alone is sufficient to resolve the
        // workflow (spec GLOSSARY: "the sole key used to match responses
        // to in-flight work").
        let has_request_identifier =
            body.get("requestId").is_some() || body.get("correlationId").is_some();
        if !has_request_identifier {
            return Err("missing requestId/correlationId");
        }

        let assignment = self
            .store
            .get_assignment(assignment_id)
            .await
            .map_err(|_| "store error resolving assignment")?;
        let Some(assignment) = assignment else {
            return Err("unknown assignmentId");
        };

        let is_error = body
            .get("error")
            .is_some()
            || body
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| s == "error")
                .unwrap_or(false);

        let outcome = if is_error {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("worker reported an error")
                .to_string();
            Outcome::Failure(message)
        } else {
            let output = body
                .get("result")
                .or_else(|| body.get("data"))
                .cloned()
                .unwrap_or(body.clone());
            Outcome::Success(output)
        };

        self.scheduler.notify(SchedulerEvent::AssignmentOutcome {
            workflow_id: assignment.workflow_id,
            assignment_id,
            outcome,
        });
        Ok(())
    }
}
