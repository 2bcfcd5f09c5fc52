//! Named, ordered sequences of coordinator runs.
//!
//! Steps execute strictly one after another, in declared order.
//! `depends_on` and `parallel_with` are validated and kept as descriptive
//! metadata but do not change the execution order.

use crate::coordinator::{Coordinator, RunReport};
use crate::types::Metadata;
use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// One step of a workflow: a request handed to a coordinator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    /// Task type for the step's run; overrides the planner's classification.
    #[serde(default)]
    pub agent_type: String,
    pub task: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallel_with: Vec<String>,
    /// Target key → source key in the accumulated context.
    #[serde(default)]
    pub context_mapping: HashMap<String, String>,
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            task: task.into(),
            depends_on: Vec::new(),
            parallel_with: Vec::new(),
            context_mapping: HashMap::new(),
        }
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    pub fn parallel_with(mut self, step: impl Into<String>) -> Self {
        self.parallel_with.push(step.into());
        self
    }

    /// Expose accumulated context `source` to this step as `target`.
    pub fn map_context(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.context_mapping.insert(target.into(), source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A registered workflow and the outcome of its latest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: BTreeMap<String, RunReport>,
    pub error: Option<String>,
}

/// Returned by [`WorkflowEngine::execute`], complete or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    /// Reports of the steps that ran, keyed by step id.
    pub step_results: BTreeMap<String, RunReport>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
    /// Initial context plus one entry per finished step.
    pub context: Metadata,
}

/// Creates workflows and runs them through a shared [`Coordinator`].
pub struct WorkflowEngine {
    coordinator: Arc<Coordinator>,
    workflows: RwLock<HashMap<Uuid, Workflow>>,
}

impl WorkflowEngine {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Register a workflow in `pending` state.
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        steps: Vec<WorkflowStep>,
    ) -> MaestroResult<Uuid> {
        validate_steps(name, &steps)?;
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            steps,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: BTreeMap::new(),
            error: None,
        };
        let id = workflow.id;
        info!(workflow_id = %id, name = %workflow.name, steps = workflow.steps.len(), "Workflow created");
        self.workflows.write().await.insert(id, workflow);
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Workflow> {
        self.workflows.read().await.get(&id).cloned()
    }

    /// All workflows, oldest first.
    pub async fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by_key(|w| w.created_at);
        workflows
    }

    /// Run every step in order. A step whose coordinator run errors marks
    /// the workflow failed and the results gathered so far are returned.
    pub async fn execute(&self, id: Uuid, context: Option<Metadata>) -> MaestroResult<WorkflowResult> {
        let steps = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(&id)
                .ok_or_else(|| MaestroError::Workflow(format!("Unknown workflow: {id}")))?;
            if workflow.status == WorkflowStatus::Running {
                return Err(MaestroError::Workflow(format!(
                    "Workflow {id} is already running"
                )));
            }
            workflow.status = WorkflowStatus::Running;
            workflow.started_at = Some(Utc::now());
            workflow.completed_at = None;
            workflow.results.clear();
            workflow.error = None;
            workflow.steps.clone()
        };
        info!(workflow_id = %id, steps = steps.len(), "Workflow started");

        let mut accumulated = context.unwrap_or_default();
        let mut step_results = BTreeMap::new();
        for step in &steps {
            let step_context = step_context(id, step, &accumulated);
            match self.coordinator.run(&step.task, step_context).await {
                Ok(report) => {
                    info!(
                        workflow_id = %id,
                        step = %step.id,
                        success_rate = report.success_rate,
                        "Workflow step finished"
                    );
                    accumulated.insert(step.id.clone(), report.output.clone());
                    step_results.insert(step.id.clone(), report);
                }
                Err(e) => {
                    warn!(workflow_id = %id, step = %step.id, error = %e, "Workflow step failed");
                    return Ok(self
                        .finish(id, WorkflowStatus::Failed, step_results, Some((step.id.clone(), e.to_string())), accumulated)
                        .await);
                }
            }
        }

        info!(workflow_id = %id, "Workflow completed");
        Ok(self
            .finish(id, WorkflowStatus::Completed, step_results, None, accumulated)
            .await)
    }

    async fn finish(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        step_results: BTreeMap<String, RunReport>,
        failure: Option<(String, String)>,
        context: Metadata,
    ) -> WorkflowResult {
        let (failed_step, error) = match failure {
            Some((step, error)) => (Some(step), Some(error)),
            None => (None, None),
        };
        if let Some(workflow) = self.workflows.write().await.get_mut(&id) {
            workflow.status = status;
            workflow.completed_at = Some(Utc::now());
            workflow.results = step_results.clone();
            workflow.error = error.clone();
        }
        WorkflowResult {
            workflow_id: id,
            status,
            step_results,
            failed_step,
            error,
            context,
        }
    }
}

fn validate_steps(name: &str, steps: &[WorkflowStep]) -> MaestroResult<()> {
    if name.trim().is_empty() {
        return Err(MaestroError::Workflow("workflow name must not be empty".to_string()));
    }
    if steps.is_empty() {
        return Err(MaestroError::Workflow(format!(
            "workflow '{name}' has no steps"
        )));
    }
    let mut ids = HashSet::new();
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(MaestroError::Workflow(format!(
                "workflow '{name}' has a step without an id"
            )));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(MaestroError::Workflow(format!(
                "workflow '{name}' has duplicate step id '{}'",
                step.id
            )));
        }
    }
    for step in steps {
        for other in step.depends_on.iter().chain(&step.parallel_with) {
            if !ids.contains(other.as_str()) {
                return Err(MaestroError::Workflow(format!(
                    "step '{}' references unknown step '{other}'",
                    step.id
                )));
            }
        }
    }
    Ok(())
}

fn step_context(workflow_id: Uuid, step: &WorkflowStep, accumulated: &Metadata) -> Metadata {
    let mut context = accumulated.clone();
    for (target, source) in &step.context_mapping {
        match accumulated.get(source) {
            Some(value) => {
                context.insert(target.clone(), value.clone());
            }
            None => warn!(step = %step.id, %source, "Context mapping source missing"),
        }
    }
    if !step.agent_type.trim().is_empty() {
        context.insert("task_type".to_string(), Value::String(step.agent_type.clone()));
    }
    context.insert("workflow_id".to_string(), Value::String(workflow_id.to_string()));
    context.insert("step_id".to_string(), Value::String(step.id.clone()));
    context
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaborators::ResultSource;
    use crate::config::OrchestratorConfig;
    use crate::coordinator::Collaborators;
    use crate::directory::Directory;
    use crate::hub::MessageHub;
    use crate::policy::PolicyRegistry;
    use crate::task_store::TaskStore;
    use crate::types::{TaskOutcome, WorkerRegistration};
    use async_trait::async_trait;
    use maestro_core::AgentId;
    use serde_json::json;

    /// Completes every task with its step id, read from the task context.
    struct StepEcho {
        tasks: Arc<RwLock<TaskStore>>,
    }

    #[async_trait]
    impl ResultSource for StepEcho {
        async fn poll(&self, _worker: &AgentId, task_id: Uuid) -> MaestroResult<Option<TaskOutcome>> {
            let store = self.tasks.read().await;
            let step = store
                .get(task_id)
                .and_then(|t| t.context.get("step_id").cloned())
                .unwrap_or(Value::Null);
            Ok(Some(TaskOutcome::Success(json!({ "step": step }))))
        }
    }

    async fn engine() -> (WorkflowEngine, Arc<RwLock<TaskStore>>) {
        let config = OrchestratorConfig {
            monitor_interval_ms: 5,
            ..OrchestratorConfig::default()
        };
        let directory = Arc::new(Directory::from_config(&config));
        let hub = Arc::new(MessageHub::from_config(&config));
        let tasks = Arc::new(RwLock::new(TaskStore::new()));
        directory
            .register(WorkerRegistration::new("any", "generalist"), ["code"], Metadata::new())
            .await;
        let collaborators = Collaborators::builtin(Arc::clone(&hub)).with_results(Arc::new(StepEcho {
            tasks: Arc::clone(&tasks),
        }));
        let coordinator = Coordinator::new(
            config,
            directory,
            hub,
            Arc::clone(&tasks),
            &PolicyRegistry::with_builtins(),
            collaborators,
        )
        .unwrap();
        (WorkflowEngine::new(Arc::new(coordinator)), tasks)
    }

    #[tokio::test]
    async fn test_create_validates_steps() {
        let (engine, _) = engine().await;
        assert!(engine.create("empty", "", vec![]).await.is_err());

        let dup = vec![
            WorkflowStep::new("a", "code", "x"),
            WorkflowStep::new("a", "code", "y"),
        ];
        let err = engine.create("dup", "", dup).await.unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");

        let dangling = vec![WorkflowStep::new("a", "code", "x").depends_on("ghost")];
        let err = engine.create("dangling", "", dangling).await.unwrap_err();
        assert!(err.to_string().contains("ghost"), "{err}");
    }

    #[tokio::test]
    async fn test_execute_runs_steps_in_order_with_context() {
        let (engine, tasks) = engine().await;
        let id = engine
            .create(
                "ship",
                "research then implement",
                vec![
                    WorkflowStep::new("research", "research", "Research parsers"),
                    WorkflowStep::new("implement", "code", "Implement the parser")
                        .depends_on("research")
                        .map_context("notes", "research"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(engine.get(id).await.unwrap().status, WorkflowStatus::Pending);

        let mut initial = Metadata::new();
        initial.insert("project".to_string(), json!("maestro"));
        let result = engine.execute(id, Some(initial)).await.unwrap();

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.step_results["research"].output, json!({"step": "research"}));
        assert_eq!(result.context["implement"], json!({"step": "implement"}));
        assert!(result.failed_step.is_none());

        let store = tasks.read().await;
        let implement = store
            .all_tasks()
            .into_iter()
            .find(|t| t.context.get("step_id") == Some(&json!("implement")))
            .unwrap();
        assert_eq!(implement.context["notes"], json!({"step": "research"}));
        assert_eq!(implement.context["project"], json!("maestro"));
        assert_eq!(implement.task_type, "code");
        drop(store);

        let workflow = engine.get(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.results.len(), 2);
        assert!(workflow.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_step_returns_partial_results() {
        let (engine, _) = engine().await;
        let id = engine
            .create(
                "broken",
                "",
                vec![
                    WorkflowStep::new("first", "code", "Implement the parser"),
                    WorkflowStep::new("second", "code", "   "),
                    WorkflowStep::new("third", "code", "Never runs"),
                ],
            )
            .await
            .unwrap();

        let result = engine.execute(id, None).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.failed_step.as_deref(), Some("second"));
        assert!(result.error.unwrap().contains("empty"));
        assert_eq!(result.step_results.keys().collect::<Vec<_>>(), vec!["first"]);

        let workflow = engine.get(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let (engine, _) = engine().await;
        let err = engine.execute(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, MaestroError::Workflow(_)));
    }

    #[tokio::test]
    async fn test_list_workflows() {
        let (engine, _) = engine().await;
        engine
            .create("one", "", vec![WorkflowStep::new("a", "", "x")])
            .await
            .unwrap();
        engine
            .create("two", "", vec![WorkflowStep::new("a", "", "y")])
            .await
            .unwrap();
        let names: Vec<String> = engine.list().await.into_iter().map(|w| w.name).collect();
        assert_eq!(names.len(), 2);
    }
}
