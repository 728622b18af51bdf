//! # Router / Pattern Detector (C5)
//!
//! Given a request payload, pick a workflow template: explicit name wins
//! if the catalog knows it, otherwise pattern detection on the payload's
//! shape, otherwise `single-worker` (spec §4.4).

use crate::catalog::{CONVERSATION_CONTEXT, EXPERT_RESEARCH, RESUME_BUILD, SINGLE_WORKER};
use crate::catalog::WorkflowCatalog;
use crate::error::CoreError;

pub struct Router<'a> {
    catalog: &'a WorkflowCatalog,
}

impl<'a> Router<'a> {
    pub fn new(catalog: &'a WorkflowCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve the workflow template name for a request (spec §4.4 Router
    /// policy, steps 1-3).
    pub fn route(
        &self,
        explicit_name: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<String, CoreError> {
        if let Some(name) = explicit_name {
            return if self.catalog.contains(name) {
                Ok(name.to_string())
            } else {
                Err(CoreError::UnknownWorkflow(name.to_string()))
            };
        }
        Ok(Self::detect_pattern(payload).to_string())
    }

    fn detect_pattern(payload: &serde_json::Value) -> &'static str {
        let has = |key: &str| payload.get(key).is_some();
        if has("experiences") && has("jobDescription") {
            RESUME_BUILD
        } else if has("researchQuery") {
            EXPERT_RESEARCH
        } else if has("messageHistory") {
            CONVERSATION_CONTEXT
        } else {
            SINGLE_WORKER
        }
    }
}
