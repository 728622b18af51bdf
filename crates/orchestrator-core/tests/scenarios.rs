//! End-to-end scheduler scenarios, built entirely on the in-memory store
//! and in-memory bus so they run with no external services. Each test
//! plays the part of a worker: subscribe to the task-dispatch topic
//! directly, decode the assignment id, and publish a fabricated response
//! on the response topic the core already subscribed to at bootstrap.

use orchestrator_core::catalog::WorkflowCatalog;
use orchestrator_core::model::{AssignmentStatus, RequestStatus, RetryPolicy, StepSpec, StepStatus};
use orchestrator_core::store::InMemoryStore;
use orchestrator_core::{catalog::WorkflowTemplate, OrchestrationCore};
use orchestrator_shared::config::OrchestratorConfig;
use orchestrator_shared::messaging::BusMessage;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

async fn boot_with_templates(templates: Vec<WorkflowTemplate>) -> Arc<OrchestrationCore> {
    let catalog = Arc::new(WorkflowCatalog::with_templates(templates));
    let core = OrchestrationCore::with_parts(
        OrchestratorConfig::default(),
        Arc::new(InMemoryStore::new()),
        catalog,
    )
    .await
    .unwrap();
    // Let the static discovery loop seed its initial snapshot before any
    // assignment is dispatched.
    tokio::time::sleep(Duration::from_millis(30)).await;
    core
}

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        backoff_ms: 0,
        exponential: false,
    }
}

/// Decode the next task-dispatch record on `rx`, returning its
/// `assignmentId` and `stepNumber`.
async fn recv_dispatch(rx: &mut Receiver<Vec<u8>>) -> (String, u64) {
    let bytes = rx.recv().await.expect("task dispatch channel closed");
    let message: BusMessage = serde_json::from_slice(&bytes).unwrap();
    let assignment_id = message.body["assignmentId"].as_str().unwrap().to_string();
    let step_number = message.body["stepNumber"].as_u64().unwrap();
    (assignment_id, step_number)
}

async fn respond_success(core: &OrchestrationCore, topic: &str, assignment_id: &str, result: Value) {
    let headers = core.bus.headers(0);
    let body = json!({
        "requestId": uuid::Uuid::new_v4(),
        "assignmentId": assignment_id,
        "result": result,
    });
    core.bus.publish(topic, body, headers).await.unwrap();
}

async fn respond_error(core: &OrchestrationCore, topic: &str, assignment_id: &str, error: &str) {
    let headers = core.bus.headers(0);
    let body = json!({
        "requestId": uuid::Uuid::new_v4(),
        "assignmentId": assignment_id,
        "status": "error",
        "error": error,
    });
    core.bus.publish(topic, body, headers).await.unwrap();
}

async fn wait_for_status(
    core: &OrchestrationCore,
    request_id: uuid::Uuid,
    status: RequestStatus,
) -> orchestrator_core::RequestView {
    for _ in 0..100 {
        let view = core.get_request_view(request_id).await.unwrap().unwrap();
        if view.status == status {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("request never reached {status:?}");
}

#[tokio::test]
async fn single_worker_happy_path_completes_with_worker_output() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let admission = core
        .admit(
            "user-1",
            None,
            json!({"workerType": "llm", "prompt": "hi"}),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(admission.status, RequestStatus::Running);

    let (assignment_id, step_number) = recv_dispatch(&mut worker).await;
    assert_eq!(step_number, 1);
    respond_success(
        &core,
        "job.responses.llm",
        &assignment_id,
        json!({"text": "hello"}),
    )
    .await;

    let view = wait_for_status(&core, admission.request_id, RequestStatus::Completed).await;
    let result = view.result.unwrap();
    assert_eq!(result["steps"]["1"]["text"], "hello");
}

#[tokio::test]
async fn retries_twice_then_succeeds_on_third_attempt() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: RetryPolicy {
                max_attempts: 3,
                backoff_ms: 10,
                exponential: true,
            },
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let admission = core
        .admit("user-1", None, json!({"workerType": "llm"}), None, None)
        .await
        .unwrap();

    let (first_id, _) = recv_dispatch(&mut worker).await;
    respond_error(&core, "job.responses.llm", &first_id, "worker crashed").await;

    let (second_id, _) = recv_dispatch(&mut worker).await;
    respond_error(&core, "job.responses.llm", &second_id, "worker crashed again").await;

    let (third_id, _) = recv_dispatch(&mut worker).await;
    respond_success(&core, "job.responses.llm", &third_id, json!({"text": "ok"})).await;

    let view = wait_for_status(&core, admission.request_id, RequestStatus::Completed).await;
    assert_eq!(view.steps[0].attempts, 3);
    assert_eq!(view.result.unwrap()["steps"]["1"]["text"], "ok");
}

#[tokio::test]
async fn timeout_arms_a_retry_that_then_succeeds() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 50,
            retry_policy: RetryPolicy {
                max_attempts: 2,
                backoff_ms: 0,
                exponential: false,
            },
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let admission = core
        .admit("user-1", None, json!({"workerType": "llm"}), None, None)
        .await
        .unwrap();

    // First attempt never responds; let its 50ms deadline elapse and the
    // scheduler arm a second attempt.
    let (first_id, _) = recv_dispatch(&mut worker).await;
    let (second_id, _) = recv_dispatch(&mut worker).await;
    assert_ne!(first_id, second_id);

    respond_success(&core, "job.responses.llm", &second_id, json!({"text": "recovered"})).await;

    let view = wait_for_status(&core, admission.request_id, RequestStatus::Completed).await;
    assert_eq!(view.steps[0].attempts, 2);
    assert_eq!(view.result.unwrap()["steps"]["1"]["text"], "recovered");

    let first_uuid = uuid::Uuid::parse_str(&first_id).unwrap();
    let first_assignment = core.store.get_assignment(first_uuid).await.unwrap().unwrap();
    assert_eq!(first_assignment.status, AssignmentStatus::TimedOut);

    let second_uuid = uuid::Uuid::parse_str(&second_id).unwrap();
    let second_assignment = core.store.get_assignment(second_uuid).await.unwrap().unwrap();
    assert_eq!(second_assignment.status, AssignmentStatus::Succeeded);
}

#[tokio::test]
async fn late_response_after_step_already_resolved_is_recorded_but_does_not_retro_advance() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let admission = core
        .admit("user-1", None, json!({"workerType": "llm"}), None, None)
        .await
        .unwrap();
    let (assignment_id, _) = recv_dispatch(&mut worker).await;
    respond_success(
        &core,
        "job.responses.llm",
        &assignment_id,
        json!({"text": "first"}),
    )
    .await;
    let view = wait_for_status(&core, admission.request_id, RequestStatus::Completed).await;
    assert_eq!(view.result.clone().unwrap()["steps"]["1"]["text"], "first");

    // A duplicate/late response for the same assignment arrives after the
    // step has already resolved. It must not change the already-completed
    // request's result.
    respond_success(
        &core,
        "job.responses.llm",
        &assignment_id,
        json!({"text": "late-duplicate"}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let view_after = core
        .get_request_view(admission.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view_after.status, RequestStatus::Completed);
    assert_eq!(view_after.result.unwrap()["steps"]["1"]["text"], "first");

    let assignment_uuid = uuid::Uuid::parse_str(&assignment_id).unwrap();
    let assignment = core
        .store
        .get_assignment(assignment_uuid)
        .await
        .unwrap()
        .unwrap();
    assert!(assignment.late);
}

#[tokio::test]
async fn upstream_terminal_failure_skips_transitive_dependents() {
    let template = WorkflowTemplate {
        name: "fan-in-failure".to_string(),
        steps: vec![
            StepSpec {
                step_number: 1,
                worker_type: "a".to_string(),
                depends_on: vec![],
                parallel: false,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
            StepSpec {
                step_number: 2,
                worker_type: "b".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
            StepSpec {
                step_number: 3,
                worker_type: "c".to_string(),
                depends_on: vec![1],
                parallel: false,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
        ],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template.clone()]).await;
    let mut worker_a = core.bus.raw_subscribe("tasks.a");

    let admission = core
        .admit("user-1", Some("fan-in-failure"), json!({}), None, None)
        .await
        .unwrap();

    let (assignment_id, _) = recv_dispatch(&mut worker_a).await;
    respond_error(&core, "job.responses.a", &assignment_id, "step 1 exploded").await;

    let view = wait_for_status(&core, admission.request_id, RequestStatus::Failed).await;
    let error = view.error.unwrap();
    assert_eq!(error.failed_step, Some(1));

    let step2 = view.steps.iter().find(|s| s.step_number == 2).unwrap();
    let step3 = view.steps.iter().find(|s| s.step_number == 3).unwrap();
    assert_eq!(step2.status, StepStatus::Skipped);
    assert_eq!(step3.status, StepStatus::Skipped);
}

#[tokio::test]
async fn parallel_fan_out_dispatches_independently_and_joins_after_all_succeed() {
    let template = WorkflowTemplate {
        name: "fan-out-join".to_string(),
        steps: vec![
            StepSpec {
                step_number: 1,
                worker_type: "fanout".to_string(),
                depends_on: vec![],
                parallel: true,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
            StepSpec {
                step_number: 2,
                worker_type: "fanout".to_string(),
                depends_on: vec![],
                parallel: true,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
            StepSpec {
                step_number: 3,
                worker_type: "fanout".to_string(),
                depends_on: vec![],
                parallel: true,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
            StepSpec {
                step_number: 4,
                worker_type: "join".to_string(),
                depends_on: vec![1, 2, 3],
                parallel: false,
                timeout_ms: 30_000,
                retry_policy: no_retry(),
            },
        ],
        final_document_step: Some(4),
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut fanout = core.bus.raw_subscribe("tasks.fanout");
    let mut join = core.bus.raw_subscribe("tasks.join");

    let admission = core
        .admit("user-1", Some("fan-out-join"), json!({}), None, None)
        .await
        .unwrap();

    // All three fan-out steps are dispatched without waiting on one
    // another; none of them depend on anything.
    let mut seen_steps = Vec::new();
    for _ in 0..3 {
        let (assignment_id, step_number) = recv_dispatch(&mut fanout).await;
        seen_steps.push(step_number);
        respond_success(
            &core,
            "job.responses.fanout",
            &assignment_id,
            json!({"branch": step_number}),
        )
        .await;
    }
    seen_steps.sort();
    assert_eq!(seen_steps, vec![1, 2, 3]);

    let (join_assignment, join_step) = recv_dispatch(&mut join).await;
    assert_eq!(join_step, 4);
    respond_success(
        &core,
        "job.responses.join",
        &join_assignment,
        json!({"merged": true}),
    )
    .await;

    let view = wait_for_status(&core, admission.request_id, RequestStatus::Completed).await;
    let result = view.result.unwrap();
    assert_eq!(result["finalDocument"]["merged"], true);
    assert_eq!(result["steps"]["1"]["branch"], 1);
    assert_eq!(result["steps"]["2"]["branch"], 2);
    assert_eq!(result["steps"]["3"]["branch"], 3);
}

#[tokio::test]
async fn idempotent_admission_returns_same_request_and_dispatches_once() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let payload = json!({"workerType": "llm"});
    let first = core
        .admit(
            "user-1",
            None,
            payload.clone(),
            None,
            Some("idem-key-1".to_string()),
        )
        .await
        .unwrap();
    assert!(first.newly_created);

    let second = core
        .admit("user-1", None, payload, None, Some("idem-key-1".to_string()))
        .await
        .unwrap();
    assert!(!second.newly_created);
    assert_eq!(second.request_id, first.request_id);

    // Only the first admission produces a dispatch.
    let (assignment_id, _) = recv_dispatch(&mut worker).await;
    let has_second_dispatch =
        tokio::time::timeout(Duration::from_millis(100), worker.recv()).await;
    assert!(
        has_second_dispatch.is_err(),
        "idempotent replay must not trigger a second Assignment"
    );

    respond_success(&core, "job.responses.llm", &assignment_id, json!({"text": "ok"})).await;
    let view = wait_for_status(&core, first.request_id, RequestStatus::Completed).await;
    assert!(view.result.is_some());

    let workflow = core.store.get_workflow_by_request(first.request_id).await.unwrap();
    assert!(workflow.is_some());
}

#[tokio::test]
async fn idempotency_key_reused_with_different_payload_conflicts() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;

    core.admit(
        "user-1",
        None,
        json!({"workerType": "llm"}),
        None,
        Some("idem-key-2".to_string()),
    )
    .await
    .unwrap();

    let err = core
        .admit(
            "user-1",
            None,
            json!({"workerType": "resume"}),
            None,
            Some("idem-key-2".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, orchestrator_core::CoreError::IdempotencyConflict { .. }));
}

#[tokio::test]
async fn retry_backoff_delay_is_observed_before_redispatch() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: RetryPolicy {
                max_attempts: 2,
                backoff_ms: 80,
                exponential: false,
            },
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    core.admit("user-1", None, json!({"workerType": "llm"}), None, None)
        .await
        .unwrap();

    let (first_id, _) = recv_dispatch(&mut worker).await;
    respond_error(&core, "job.responses.llm", &first_id, "worker crashed").await;

    // The retry must not be redispatched before its backoff elapses.
    let too_soon = tokio::time::timeout(Duration::from_millis(30), recv_dispatch(&mut worker)).await;
    assert!(too_soon.is_err(), "retry redispatched before its backoff delay elapsed");

    let (second_id, _) = recv_dispatch(&mut worker).await;
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn assignment_status_reflects_worker_failure_classification() {
    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let core = boot_with_templates(vec![template]).await;
    let mut worker = core.bus.raw_subscribe("tasks.llm");

    let admission = core
        .admit("user-1", None, json!({"workerType": "llm"}), None, None)
        .await
        .unwrap();
    let (assignment_id, _) = recv_dispatch(&mut worker).await;
    respond_error(&core, "job.responses.llm", &assignment_id, "boom").await;

    wait_for_status(&core, admission.request_id, RequestStatus::Failed).await;

    let assignment_uuid = uuid::Uuid::parse_str(&assignment_id).unwrap();
    let assignment = core
        .store
        .get_assignment(assignment_uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.status, AssignmentStatus::Failed);
    assert_eq!(assignment.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn admission_is_rejected_once_a_worker_type_stays_saturated() {
    use orchestrator_core::CoreError;

    let template = WorkflowTemplate {
        name: "single-worker".to_string(),
        steps: vec![StepSpec {
            step_number: 1,
            worker_type: String::new(),
            depends_on: vec![],
            parallel: false,
            timeout_ms: 30_000,
            retry_policy: no_retry(),
        }],
        final_document_step: None,
        estimated_duration_ms: 1_000,
    };
    let catalog = Arc::new(WorkflowCatalog::with_templates(vec![template]));
    let mut config = OrchestratorConfig::default();
    config.saturation_threshold_ms = 10;
    let core = OrchestrationCore::with_parts(config, Arc::new(InMemoryStore::new()), catalog)
        .await
        .unwrap();

    // "ghost" is never registered with the worker registry (single-worker's
    // worker type is resolved from the payload at instantiation time, so
    // the static discovery loop never seeds it), so every dispatch attempt
    // leaves the step `READY` for want of a worker (spec §5).
    let first = core
        .admit("user-1", None, json!({"workerType": "ghost"}), None, None)
        .await
        .unwrap();
    assert_eq!(first.status, RequestStatus::Running);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let err = core
        .admit("user-1", None, json!({"workerType": "ghost"}), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Saturated(worker_type) if worker_type == "ghost"));
}
