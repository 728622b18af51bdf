//! # Workflow Catalog (C4)
//!
//! Templates are enumerated at startup: `resume-build`, `expert-research`,
//! `conversation-context`, and the template-free `single-worker` passthrough
//! (spec §4.4).

use crate::model::{RetryPolicy, StepSpec};
use std::collections::HashMap;

/// A named, ordered step graph. `single-worker` is special-cased by the
/// catalog: its single step's `worker_type` is not fixed at template
/// definition time but taken from the request payload's `workerType` field
/// at instantiation (spec §4.4).
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub name: String,
    pub steps: Vec<StepSpec>,
    /// Step number whose output becomes the request's top-level
    /// `finalDocument` field on success (spec §4.6), if the template
    /// defines one.
    pub final_document_step: Option<u32>,
    /// A static per-workflow duration estimate surfaced in the admission
    /// response (spec §4.8 `estimatedDuration`).
    pub estimated_duration_ms: u64,
}

pub const SINGLE_WORKER: &str = "single-worker";
pub const RESUME_BUILD: &str = "resume-build";
pub const EXPERT_RESEARCH: &str = "expert-research";
pub const CONVERSATION_CONTEXT: &str = "conversation-context";

fn default_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_ms: 500,
        exponential: true,
    }
}

pub struct WorkflowCatalog {
    templates: HashMap<String, WorkflowTemplate>,
}

impl std::fmt::Debug for WorkflowCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCatalog")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self::with_builtin_templates()
    }
}

impl WorkflowCatalog {
    /// Build a catalog from an arbitrary template set, keyed by
    /// `WorkflowTemplate::name`. Used by tests that need scenario-specific
    /// timeouts and retry policies the builtin templates don't carry.
    pub fn with_templates(templates: Vec<WorkflowTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn with_builtin_templates() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            SINGLE_WORKER.to_string(),
            WorkflowTemplate {
                name: SINGLE_WORKER.to_string(),
                // worker_type is a placeholder; resolved at instantiation
                // from the payload's `workerType` field.
                steps: vec![StepSpec {
                    step_number: 1,
                    worker_type: String::new(),
                    depends_on: vec![],
                    parallel: false,
                    timeout_ms: 30_000,
                    retry_policy: default_retry(),
                }],
                final_document_step: None,
                estimated_duration_ms: 5_000,
            },
        );

        templates.insert(
            RESUME_BUILD.to_string(),
            WorkflowTemplate {
                name: RESUME_BUILD.to_string(),
                steps: vec![
                    StepSpec {
                        step_number: 1,
                        worker_type: "resume".to_string(),
                        depends_on: vec![],
                        parallel: false,
                        timeout_ms: 60_000,
                        retry_policy: default_retry(),
                    },
                    StepSpec {
                        step_number: 2,
                        worker_type: "llm".to_string(),
                        depends_on: vec![1],
                        parallel: false,
                        timeout_ms: 45_000,
                        retry_policy: default_retry(),
                    },
                ],
                final_document_step: Some(2),
                estimated_duration_ms: 90_000,
            },
        );

        templates.insert(
            EXPERT_RESEARCH.to_string(),
            WorkflowTemplate {
                name: EXPERT_RESEARCH.to_string(),
                steps: vec![
                    StepSpec {
                        step_number: 1,
                        worker_type: "research".to_string(),
                        depends_on: vec![],
                        parallel: false,
                        timeout_ms: 120_000,
                        retry_policy: default_retry(),
                    },
                    StepSpec {
                        step_number: 2,
                        worker_type: "llm".to_string(),
                        depends_on: vec![1],
                        parallel: false,
                        timeout_ms: 45_000,
                        retry_policy: default_retry(),
                    },
                ],
                final_document_step: Some(2),
                estimated_duration_ms: 150_000,
            },
        );

        templates.insert(
            CONVERSATION_CONTEXT.to_string(),
            WorkflowTemplate {
                name: CONVERSATION_CONTEXT.to_string(),
                steps: vec![StepSpec {
                    step_number: 1,
                    worker_type: "llm".to_string(),
                    depends_on: vec![],
                    parallel: false,
                    timeout_ms: 30_000,
                    retry_policy: default_retry(),
                }],
                final_document_step: Some(1),
                estimated_duration_ms: 20_000,
            },
        );

        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn worker_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .templates
            .values()
            .flat_map(|t| t.steps.iter().map(|s| s.worker_type.clone()))
            .filter(|t| !t.is_empty())
            .collect();
        types.sort();
        types.dedup();
        types
    }
}
