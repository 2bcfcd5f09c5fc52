//! End-to-end orchestration tests.
//!
//! Workers run as real [`WorkerRuntime`] loops on the hub; the coordinator
//! only sees them through the directory and their task-result replies.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use maestro_core::{AgentId, MaestroError, MaestroResult};
use maestro_orchestrator::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Replies with its own name and the task description, after an optional delay.
struct Echo {
    name: &'static str,
    delay: Duration,
}

impl Echo {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay: Duration::ZERO,
        })
    }

    fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self { name, delay })
    }
}

#[async_trait]
impl TaskExecutor for Echo {
    async fn execute(&self, task: &Task) -> MaestroResult<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if task.description.contains("explode") {
            return Err(MaestroError::Worker(format!("{} exploded", self.name)));
        }
        Ok(json!({ "worker": self.name, "task": task.description }))
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        monitor_interval_ms: 5,
        ..OrchestratorConfig::default()
    }
}

fn registration(id: &str, worker_type: &str) -> WorkerRegistration {
    WorkerRegistration::new(id, worker_type).with_id(id)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_capability_match_selects_matching_worker() {
    let orchestrator = Orchestrator::new(config()).unwrap();
    let (a, ha) = orchestrator
        .spawn_worker(registration("a", "coder"), ["code"], Echo::new("a"))
        .await;
    let (b, hb) = orchestrator
        .spawn_worker(registration("b", "researcher"), ["research"], Echo::new("b"))
        .await;

    let report = orchestrator
        .process_request("Implement the parser function", Metadata::new())
        .await
        .unwrap();

    assert_eq!(report.analysis.required_capabilities, vec!["code".to_string()]);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.success_rate, 1.0);
    assert_eq!(report.output["worker"], json!("a"));

    let a = orchestrator.directory().get(&a).await.unwrap();
    let b = orchestrator.directory().get(&b).await.unwrap();
    assert_eq!(a.task_history, report.completed);
    assert!(b.task_history.is_empty());

    ha.abort();
    hb.abort();
}

#[tokio::test]
async fn test_second_assignment_fails_while_first_in_progress() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        max_concurrent_per_agent: 1,
        ..config()
    })
    .unwrap();
    let (_, handle) = orchestrator
        .spawn_worker(
            registration("solo", "coder"),
            ["code"],
            Echo::slow("solo", Duration::from_millis(50)),
        )
        .await;

    // Three sentences and a scope word make the keyword planner call it high complexity.
    let report = orchestrator
        .process_request(
            "Implement the complete lexer. Implement the parser. Implement the printer.",
            Metadata::new(),
        )
        .await
        .unwrap();
    handle.abort();

    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.reason == "no eligible worker"));
    assert!((report.success_rate - 1.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unresponsive_worker_times_out() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        // 60ms
        default_task_timeout_minutes: 0.001,
        ..config()
    })
    .unwrap();
    // Registered but nobody serves its mailbox.
    let mute = orchestrator
        .register_worker(registration("mute", "coder"), ["code"], Metadata::new())
        .await;

    let report = orchestrator
        .process_request("Implement the parser", Metadata::new())
        .await
        .unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].reason, "timeout");
    assert_eq!(report.success_rate, 0.0);

    match orchestrator.get_task_status(Some(report.failed[0].task_id)).await {
        Some(TaskStatusReport::Single { task }) => {
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.error.as_deref(), Some("timeout"));
        }
        other => panic!("unexpected task status: {other:?}"),
    }
    let mute = orchestrator.directory().get(&mute).await.unwrap();
    assert_eq!(mute.status, WorkerStatus::Idle);
    assert_eq!(orchestrator.hub().mailbox_size(&mute.id).await, Some(1));
}

#[tokio::test]
async fn test_full_mailbox_moves_assignment_to_next_worker() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        max_queue_size: 1,
        ..config()
    })
    .unwrap();
    let a = orchestrator
        .register_worker(registration("a", "coder"), ["code"], Metadata::new())
        .await;
    let (_, hb) = orchestrator
        .spawn_worker(registration("b", "coder"), ["code"], Echo::new("b"))
        .await;

    // Fill a's mailbox so the hub refuses the assignment.
    let filler = Message::new("someone", a.clone(), MessageType::Direct, "hello");
    assert!(orchestrator.hub().send(filler).await);

    let report = orchestrator
        .process_request("Implement the parser", Metadata::new())
        .await
        .unwrap();
    hb.abort();

    assert_eq!(report.success_rate, 1.0);
    assert_eq!(report.output["worker"], json!("b"));
    assert_eq!(orchestrator.hub().mailbox_size(&a).await, Some(1));
    assert!(orchestrator.hub().stats().await.backpressure_rejections >= 1);
    assert_eq!(orchestrator.directory().get(&a).await.unwrap().load(), 0);
}

#[tokio::test]
async fn test_complexity_controls_task_count() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        max_concurrent_per_agent: 5,
        ..config()
    })
    .unwrap();
    let (_, handle) = orchestrator
        .spawn_worker(registration("w", "coder"), ["code", "research"], Echo::new("w"))
        .await;

    let low = orchestrator
        .process_request("Implement the parser", Metadata::new())
        .await
        .unwrap();
    assert_eq!(low.completed.len() + low.failed.len(), 1);

    let high = orchestrator
        .process_request(
            "Research parser generators. Compare their error recovery. Implement the best one. Write a summary.",
            Metadata::new(),
        )
        .await
        .unwrap();
    handle.abort();

    let total = high.completed.len() + high.failed.len();
    assert!((2..=5).contains(&total), "got {total} tasks");
    assert_eq!(high.completed.len(), 4);
    // Every subtask went to the one worker, so its name is merged into a list.
    assert_eq!(high.output["worker"], json!(["w", "w", "w", "w"]));
}

#[tokio::test]
async fn test_worker_failure_is_reported_not_raised() {
    let orchestrator = Orchestrator::new(config()).unwrap();
    let (_, handle) = orchestrator
        .spawn_worker(registration("w", "coder"), ["code"], Echo::new("w"))
        .await;

    let report = orchestrator
        .process_request("Implement and explode", Metadata::new())
        .await
        .unwrap();
    handle.abort();

    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("w exploded"));
    assert_eq!(report.success_rate, 0.0);
    let metrics = orchestrator.get_performance_metrics().await;
    assert_eq!(metrics.runs.tasks_failed, 1);
    assert_eq!(metrics.runs.workers[&AgentId::from("w")].failed, 1);
}

#[tokio::test]
async fn test_workflow_with_live_workers() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        assignment_strategy: "specialization".to_string(),
        ..config()
    })
    .unwrap();
    let (_, hr) = orchestrator
        .spawn_worker(registration("r", "researcher"), ["research"], Echo::new("r"))
        .await;
    let (_, hc) = orchestrator
        .spawn_worker(registration("c", "coder"), ["code"], Echo::new("c"))
        .await;

    let id = orchestrator
        .create_workflow(
            "parser",
            "research, implement, then fail",
            vec![
                WorkflowStep::new("research", "research", "Survey parsing approaches"),
                WorkflowStep::new("implement", "code", "Write the parser")
                    .depends_on("research")
                    .map_context("findings", "research"),
                WorkflowStep::new("broken", "code", ""),
            ],
        )
        .await
        .unwrap();

    let result = orchestrator.execute_workflow(id, None).await.unwrap();
    hr.abort();
    hc.abort();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.failed_step.as_deref(), Some("broken"));
    assert_eq!(result.step_results.len(), 2);
    assert_eq!(result.step_results["research"].output["worker"], json!("r"));
    assert_eq!(result.step_results["implement"].output["worker"], json!("c"));
    assert_eq!(
        result.context["research"],
        result.step_results["research"].output
    );
}

#[tokio::test]
async fn test_health_check_is_stable_without_heartbeats() {
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        heartbeat_timeout_seconds: 0,
        ..config()
    })
    .unwrap();
    orchestrator
        .register_worker(registration("quiet", "coder"), ["code"], Metadata::new())
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let first = orchestrator.directory().check_health().await;
    let second = orchestrator.directory().check_health().await;
    assert_eq!(first.offline_ids(), vec![AgentId::from("quiet")]);
    assert_eq!(first.offline_ids(), second.offline_ids());

    // Offline workers are not assignable.
    let report = orchestrator
        .process_request("Implement the parser", Metadata::new())
        .await
        .unwrap();
    assert_eq!(report.failed[0].reason, "no eligible worker");

    assert!(orchestrator.directory().heartbeat(&AgentId::from("quiet"), None).await);
    assert_eq!(orchestrator.get_agent_status().await.idle, 1);
}
