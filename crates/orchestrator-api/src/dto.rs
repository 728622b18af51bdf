//! # Wire DTOs
//!
//! Request/response bodies for the Orchestration API (spec §4.8, §6). The
//! core's own [`orchestrator_core::Admission`] and
//! [`orchestrator_core::RequestView`] are serialized directly where their
//! shape already matches the wire contract; this module only adds the
//! inbound body and the admission response envelope.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// `POST /orchestrate` body (spec §6).
///
/// `data` is an opaque, caller-defined payload (spec §9 "Dynamic
/// payloads"): the API never interprets it beyond handing it to the
/// Router for pattern detection, so it is modeled as a raw
/// [`serde_json::Value`] rather than a typed struct.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrchestrateRequest {
    /// Explicit workflow template name. Absent triggers pattern detection
    /// on `data` (spec §4.4 Router policy).
    pub workflow: Option<String>,
    pub data: serde_json::Value,
    #[validate(length(min = 1, max = 256))]
    pub correlation_id: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub idempotency_key: Option<String>,
}

/// `202` response body for a newly admitted (or idempotently replayed)
/// request (spec §4.8).
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrateResponse {
    pub request_id: uuid::Uuid,
    pub status: orchestrator_core::model::RequestStatus,
    pub estimated_duration: u64,
    pub status_url: String,
}

impl OrchestrateResponse {
    pub fn from_admission(admission: &orchestrator_core::Admission) -> Self {
        Self {
            request_id: admission.request_id,
            status: admission.status,
            estimated_duration: admission.estimated_duration_ms,
            status_url: format!("/orchestrate/{}", admission.request_id),
        }
    }
}
