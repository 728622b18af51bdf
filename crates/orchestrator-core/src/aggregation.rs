//! # Result Aggregation (spec §4.6)
//!
//! Deterministic folding of step outputs into the request's final result
//! shape once a workflow reaches terminal success. No I/O.

use crate::catalog::WorkflowTemplate;
use crate::model::Workflow;
use serde_json::{Map, Value};

/// `{ stepNumber -> stepOutput }`, plus the template's `finalDocument`
/// field when it names one.
pub fn aggregate(workflow: &Workflow, template: Option<&WorkflowTemplate>) -> Value {
    let mut steps = Map::new();
    for step in &workflow.steps {
        if let Some(state) = workflow.state.get(&step.step_number) {
            if let Some(output) = &state.output {
                steps.insert(step.step_number.to_string(), output.clone());
            }
        }
    }

    let mut result = Map::new();
    if let Some(final_step) = template.and_then(|t| t.final_document_step) {
        if let Some(output) = steps.get(&final_step.to_string()) {
            result.insert("finalDocument".to_string(), output.clone());
        }
    }
    result.insert("steps".to_string(), Value::Object(steps));
    Value::Object(result)
}

/// Partial outputs for a failed workflow, surfaced under `result.partial`
/// for debuggability (spec §7 "other steps' partial outputs remain in
/// `result.partial`").
pub fn partial(workflow: &Workflow) -> Value {
    let mut steps = Map::new();
    for step in &workflow.steps {
        if let Some(state) = workflow.state.get(&step.step_number) {
            if let Some(output) = &state.output {
                steps.insert(step.step_number.to_string(), output.clone());
            }
        }
    }
    Value::Object(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StepSpec, StepState, StepStatus};
    use std::collections::HashMap;

    fn workflow_with_outputs() -> Workflow {
        let mut state = HashMap::new();
        let mut s1 = StepState::pending();
        s1.status = StepStatus::Succeeded;
        s1.output = Some(serde_json::json!({"text": "draft"}));
        state.insert(1, s1);
        let mut s2 = StepState::pending();
        s2.status = StepStatus::Succeeded;
        s2.output = Some(serde_json::json!({"text": "final"}));
        state.insert(2, s2);

        Workflow {
            id: uuid::Uuid::new_v4(),
            request_id: uuid::Uuid::new_v4(),
            template_name: "resume-build".to_string(),
            steps: vec![
                StepSpec {
                    step_number: 1,
                    worker_type: "resume".to_string(),
                    depends_on: vec![],
                    parallel: false,
                    timeout_ms: 1000,
                    retry_policy: Default::default(),
                },
                StepSpec {
                    step_number: 2,
                    worker_type: "llm".to_string(),
                    depends_on: vec![1],
                    parallel: false,
                    timeout_ms: 1000,
                    retry_policy: Default::default(),
                },
            ],
            current_step: 2,
            state,
            version: 1,
        }
    }

    #[test]
    fn aggregates_every_step_output() {
        let workflow = workflow_with_outputs();
        let result = aggregate(&workflow, None);
        assert_eq!(result["steps"]["1"]["text"], "draft");
        assert_eq!(result["steps"]["2"]["text"], "final");
    }

    #[test]
    fn final_document_pulls_from_named_step() {
        let workflow = workflow_with_outputs();
        let template = WorkflowTemplate {
            name: "resume-build".to_string(),
            steps: workflow.steps.clone(),
            final_document_step: Some(2),
            estimated_duration_ms: 0,
        };
        let result = aggregate(&workflow, Some(&template));
        assert_eq!(result["finalDocument"]["text"], "final");
    }
}
