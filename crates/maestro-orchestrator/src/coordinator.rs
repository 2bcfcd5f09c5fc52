//! Per-request supervisor.
//!
//! A [`Coordinator`] drives one [`WorkflowRun`] through
//! analyze → plan → assign → monitor ⇄ coordinate → consolidate → complete.
//! Each phase is one call to [`Coordinator::step`], which performs the
//! phase and returns the next one. Task failures are recorded in the run and
//! never abort it; a run always ends with a [`RunReport`].

use crate::collaborators::{
    Complexity, Decomposer, KeywordPlanner, Planner, RequestAnalysis, ResultSource,
    SentenceDecomposer,
};
use crate::config::OrchestratorConfig;
use crate::directory::Directory;
use crate::hub::MessageHub;
use crate::metrics::{PerformanceTracker, TaskTally};
use crate::policy::{AssignmentPolicy, PolicyRegistry};
use crate::task_store::TaskStore;
use crate::types::{Message, MessageType, Metadata, Task, TaskOutcome, TaskStatus, WorkerDescriptor};
use crate::worker::HubResultSource;
use chrono::{DateTime, Utc};
use maestro_core::{AgentId, MaestroError, MaestroResult, MessagePriority, TaskPriority};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mailbox the coordinator sends from and receives results in.
pub const COORDINATOR_ID: &str = "coordinator";

/// Failure reason recorded for a task whose worker was unregistered mid-run.
pub const DELEGATED_REASON: &str = "delegated: worker unregistered";

/// States of the coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AnalyzeRequest,
    PlanExecution,
    AssignTasks,
    MonitorProgress,
    CoordinateAgents,
    ConsolidateResults,
    CompleteWorkflow,
    /// Reached after `CompleteWorkflow`; stepping a finished run is a no-op.
    Finished,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self == Phase::Finished
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::AnalyzeRequest => "analyze_request",
            Phase::PlanExecution => "plan_execution",
            Phase::AssignTasks => "assign_tasks",
            Phase::MonitorProgress => "monitor_progress",
            Phase::CoordinateAgents => "coordinate_agents",
            Phase::ConsolidateResults => "consolidate_results",
            Phase::CompleteWorkflow => "complete_workflow",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// A task that ended in `failed`, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task_id: Uuid,
    pub reason: String,
}

/// A dependency whose two ends run on different workers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Blocking {
    blocked: Uuid,
    blocked_worker: AgentId,
    blocking: Uuid,
    blocking_worker: AgentId,
}

/// Transient state of one coordinator invocation.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub request: String,
    pub context: Metadata,
    pub phase: Phase,
    pub analysis: Option<RequestAnalysis>,
    /// Every task created for this run, in plan order.
    pub tasks: Vec<Uuid>,
    pub assignments: HashMap<Uuid, AgentId>,
    pub results: HashMap<Uuid, Value>,
    /// Tasks not yet completed or failed.
    pub active: Vec<Uuid>,
    pub completed: Vec<Uuid>,
    pub failed: Vec<FailedTask>,
    pub iteration: u32,
    pub max_iterations: u32,
    /// Collaborator and bookkeeping errors that did not stop the run.
    pub errors: Vec<String>,
    pub output: Value,
    pub success_rate: f64,
    pub started_at: DateTime<Utc>,
    coordinated: HashSet<(Uuid, Uuid)>,
    pending_coordination: Option<Blocking>,
}

impl WorkflowRun {
    fn new(request: String, context: Metadata, max_iterations: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            context,
            phase: Phase::AnalyzeRequest,
            analysis: None,
            tasks: Vec::new(),
            assignments: HashMap::new(),
            results: HashMap::new(),
            active: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            iteration: 0,
            max_iterations,
            errors: Vec::new(),
            output: Value::Object(serde_json::Map::new()),
            success_rate: 0.0,
            started_at: Utc::now(),
            coordinated: HashSet::new(),
            pending_coordination: None,
        }
    }

    fn into_report(self) -> RunReport {
        RunReport {
            run_id: self.id,
            request: self.request,
            analysis: self.analysis.unwrap_or_default(),
            success_rate: self.success_rate,
            completed: self.completed,
            failed: self.failed,
            output: self.output,
            errors: self.errors,
            iterations: self.iteration,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// What a finished coordinator run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub request: String,
    pub analysis: RequestAnalysis,
    /// completed / (completed + failed); 0.0 when no task finished.
    pub success_rate: f64,
    pub completed: Vec<Uuid>,
    pub failed: Vec<FailedTask>,
    /// Merged results of the completed tasks.
    pub output: Value,
    pub errors: Vec<String>,
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// External collaborators a coordinator calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn Planner>,
    pub decomposer: Arc<dyn Decomposer>,
    pub results: Arc<dyn ResultSource>,
}

impl Collaborators {
    /// Keyword planner, sentence decomposer and results read from the
    /// coordinator's hub mailbox.
    pub fn builtin(hub: Arc<MessageHub>) -> Self {
        Self {
            planner: Arc::new(KeywordPlanner),
            decomposer: Arc::new(SentenceDecomposer),
            results: Arc::new(HubResultSource::new(hub, AgentId::from(COORDINATOR_ID))),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_results(mut self, results: Arc<dyn ResultSource>) -> Self {
        self.results = results;
        self
    }
}

/// Merge task results into one object. Object fields are merged by key and
/// a key seen more than once collects its values into a list; non-object
/// results are merged under `result`.
pub fn consolidate<'a, I>(results: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    use serde_json::map::Entry;

    let mut merged = serde_json::Map::new();
    let mut listed: HashSet<String> = HashSet::new();
    let mut merge = |key: &str, value: Value| match merged.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => {
            if listed.contains(key) {
                if let Value::Array(items) = slot.get_mut() {
                    items.push(value);
                }
            } else {
                let first = slot.insert(Value::Null);
                slot.insert(Value::Array(vec![first, value]));
                listed.insert(key.to_string());
            }
        }
    };

    for result in results {
        match result {
            Value::Object(fields) => {
                for (key, value) in fields {
                    merge(key, value.clone());
                }
            }
            other => merge("result", other.clone()),
        }
    }
    Value::Object(merged)
}

/// Drives requests through the coordinator state machine.
pub struct Coordinator {
    id: AgentId,
    config: OrchestratorConfig,
    directory: Arc<Directory>,
    hub: Arc<MessageHub>,
    tasks: Arc<RwLock<TaskStore>>,
    policy: Arc<dyn AssignmentPolicy>,
    collaborators: Collaborators,
    metrics: Arc<PerformanceTracker>,
}

impl Coordinator {
    /// Build a coordinator using the policy named by
    /// `config.assignment_strategy`.
    pub fn new(
        config: OrchestratorConfig,
        directory: Arc<Directory>,
        hub: Arc<MessageHub>,
        tasks: Arc<RwLock<TaskStore>>,
        policies: &PolicyRegistry,
        collaborators: Collaborators,
    ) -> MaestroResult<Self> {
        config.validate()?;
        let policy = policies.get(&config.assignment_strategy).ok_or_else(|| {
            MaestroError::Config(format!(
                "Unknown assignment strategy '{}' (known: {})",
                config.assignment_strategy,
                policies.names().join(", ")
            ))
        })?;
        info!(policy = policy.name(), "Coordinator ready");
        Ok(Self {
            id: AgentId::from(COORDINATOR_ID),
            config,
            directory,
            hub,
            tasks,
            policy,
            collaborators,
            metrics: Arc::new(PerformanceTracker::new()),
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn metrics(&self) -> &Arc<PerformanceTracker> {
        &self.metrics
    }

    /// Create a run in `AnalyzeRequest` without executing anything.
    pub fn start(&self, request: &str, context: Metadata) -> MaestroResult<WorkflowRun> {
        let request = request.trim();
        if request.is_empty() {
            return Err(MaestroError::Validation(
                "request must not be empty".to_string(),
            ));
        }
        Ok(WorkflowRun::new(
            request.to_string(),
            context,
            self.config.max_iterations,
        ))
    }

    /// Run a request to completion.
    pub async fn run(&self, request: &str, context: Metadata) -> MaestroResult<RunReport> {
        let mut run = self.start(request, context)?;
        info!(run_id = %run.id, request = %run.request, "Coordinator run started");
        while !run.phase.is_terminal() {
            self.step(&mut run).await;
        }
        Ok(run.into_report())
    }

    /// Execute the run's current phase and move it to the next one.
    pub async fn step(&self, run: &mut WorkflowRun) -> Phase {
        let current = run.phase;
        let next = match current {
            Phase::AnalyzeRequest => self.analyze_request(run).await,
            Phase::PlanExecution => self.plan_execution(run).await,
            Phase::AssignTasks => self.assign_tasks(run).await,
            Phase::MonitorProgress => self.monitor_progress(run).await,
            Phase::CoordinateAgents => self.coordinate_agents(run).await,
            Phase::ConsolidateResults => self.consolidate_results(run),
            Phase::CompleteWorkflow => self.complete_workflow(run).await,
            Phase::Finished => Phase::Finished,
        };
        if next != current {
            debug!(run_id = %run.id, from = %current, to = %next, "Coordinator phase");
        }
        run.phase = next;
        next
    }

    async fn analyze_request(&self, run: &mut WorkflowRun) -> Phase {
        let mut analysis = match self.collaborators.planner.analyze(&run.request).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Planner failed, using neutral classification");
                run.errors.push(format!("planner: {e}"));
                RequestAnalysis::neutral()
            }
        };

        if let Some(task_type) = run.context.get("task_type").and_then(Value::as_str) {
            analysis.task_type = task_type.to_string();
        }
        if let Some(caps) = run
            .context
            .get("required_capabilities")
            .and_then(Value::as_array)
        {
            analysis.required_capabilities = caps
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        info!(
            run_id = %run.id,
            task_type = %analysis.task_type,
            complexity = ?analysis.complexity,
            capabilities = ?analysis.required_capabilities,
            "Request analyzed"
        );
        run.analysis = Some(analysis);
        Phase::PlanExecution
    }

    async fn plan_execution(&self, run: &mut WorkflowRun) -> Phase {
        let analysis = run.analysis.clone().unwrap_or_default();

        let descriptions = if analysis.complexity == Complexity::High {
            match self
                .collaborators
                .decomposer
                .decompose(&run.request, &analysis)
                .await
            {
                Ok(parts) if parts.len() >= SentenceDecomposer::MIN_SUBTASKS => {
                    if parts.len() > SentenceDecomposer::MAX_SUBTASKS {
                        warn!(
                            run_id = %run.id,
                            subtasks = parts.len(),
                            "Decomposer returned too many subtasks, folding the rest into the last"
                        );
                    }
                    SentenceDecomposer::fold_overflow(parts)
                }
                Ok(parts) => {
                    warn!(
                        run_id = %run.id,
                        subtasks = parts.len(),
                        "Decomposer returned too few subtasks, planning a single task"
                    );
                    run.errors.push(format!(
                        "decomposer: returned {} subtask(s), expected {} to {}",
                        parts.len(),
                        SentenceDecomposer::MIN_SUBTASKS,
                        SentenceDecomposer::MAX_SUBTASKS
                    ));
                    vec![run.request.clone()]
                }
                Err(e) => {
                    warn!(run_id = %run.id, error = %e, "Decomposer failed, planning a single task");
                    run.errors.push(format!("decomposer: {e}"));
                    vec![run.request.clone()]
                }
            }
        } else {
            vec![run.request.clone()]
        };

        let priority = run
            .context
            .get("priority")
            .and_then(Value::as_str)
            .map(TaskPriority::parse_level)
            .unwrap_or_default();
        let chained = !analysis.dependencies.is_empty();
        let timeout = self.config.task_timeout();

        let mut store = self.tasks.write().await;
        let mut previous: Option<Uuid> = None;
        for description in descriptions {
            let mut task = Task::new(description, analysis.task_type.clone())
                .with_priority(priority)
                .with_capabilities(analysis.required_capabilities.clone())
                .with_timeout(timeout)
                .with_context(run.context.clone());
            if let (true, Some(prev)) = (chained, previous) {
                task = task.with_dependencies(vec![prev]);
            }
            task.run_id = Some(run.id);
            let id = store.add(task);
            run.tasks.push(id);
            run.active.push(id);
            previous = Some(id);
        }

        info!(run_id = %run.id, tasks = run.tasks.len(), chained, "Execution planned");
        Phase::AssignTasks
    }

    async fn assign_tasks(&self, run: &mut WorkflowRun) -> Phase {
        let pending: Vec<Task> = {
            let store = self.tasks.read().await;
            run.active
                .iter()
                .filter_map(|id| store.get(*id))
                .filter(|t| t.status == TaskStatus::Pending)
                .cloned()
                .collect()
        };

        for task in pending {
            match self.assign(&task).await {
                Ok(worker) => {
                    run.assignments.insert(task.id, worker);
                }
                Err(reason) => self.fail_task(run, task.id, reason).await,
            }
        }
        Phase::MonitorProgress
    }

    /// Pick a worker, reserve capacity and deliver the assignment. A worker
    /// whose mailbox refuses the message is excluded and the policy asked
    /// again; the error is the failure reason.
    async fn assign(&self, task: &Task) -> Result<AgentId, String> {
        if self.tasks.read().await.in_flight_count() >= self.config.max_concurrent_tasks {
            return Err("max concurrent tasks reached".to_string());
        }

        let mut refused: Vec<AgentId> = Vec::new();
        loop {
            let candidates: Vec<WorkerDescriptor> = self
                .directory
                .candidates()
                .await
                .into_iter()
                .filter(|w| !refused.contains(&w.id))
                .collect();
            let Some(worker) = self.policy.select(task, &candidates) else {
                return Err(if refused.is_empty() {
                    "no eligible worker".to_string()
                } else {
                    format!("assignment refused by {} worker(s)", refused.len())
                });
            };
            if refused.contains(&worker) {
                return Err(format!("policy selected ineligible worker {worker}"));
            }
            if !self.directory.add_task(&worker, task.id).await {
                debug!(task_id = %task.id, worker = %worker, "Worker lost capacity before assignment");
                refused.push(worker);
                continue;
            }

            let mut payload = task.clone();
            payload.assigned_to = Some(worker.clone());
            let content = match serde_json::to_string(&payload) {
                Ok(content) => content,
                Err(e) => {
                    self.directory.remove_task(&worker, task.id).await;
                    return Err(format!("failed to encode task: {e}"));
                }
            };
            let message = Message::new(
                self.id.clone(),
                worker.clone(),
                MessageType::TaskAssignment,
                content,
            )
            .with_priority(MessagePriority::from(task.priority))
            .with_metadata("task_id", json!(task.id.to_string()))
            .requiring_response();

            if self.hub.send(message).await {
                let mut store = self.tasks.write().await;
                store.mark_assigned(task.id, worker.clone());
                store.mark_in_progress(task.id);
                info!(
                    task_id = %task.id,
                    worker = %worker,
                    policy = self.policy.name(),
                    "Task assigned"
                );
                return Ok(worker);
            }

            warn!(task_id = %task.id, worker = %worker, "Assignment refused by worker mailbox");
            self.directory.remove_task(&worker, task.id).await;
            refused.push(worker);
        }
    }

    async fn monitor_progress(&self, run: &mut WorkflowRun) -> Phase {
        run.iteration += 1;

        for id in run.active.clone() {
            let Some(task) = self.tasks.read().await.get(id).cloned() else {
                run.active.retain(|t| *t != id);
                run.errors.push(format!("task {id} disappeared from the store"));
                continue;
            };
            if task.status == TaskStatus::Delegated {
                self.release_delegated(run, &task).await;
                continue;
            }
            let Some(worker) = task.assigned_to.clone() else {
                continue;
            };

            match self.collaborators.results.poll(&worker, id).await {
                Ok(Some(TaskOutcome::Success(value))) => {
                    self.complete_task(run, id, value).await;
                    continue;
                }
                Ok(Some(TaskOutcome::Failure(reason))) => {
                    self.fail_task(run, id, reason).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id = %id, worker = %worker, error = %e, "Result poll failed");
                    run.errors.push(format!("result poll for task {id}: {e}"));
                }
            }

            if task.is_overdue(Utc::now()) {
                self.fail_task(run, id, "timeout").await;
            }
        }

        if run.active.is_empty() {
            return Phase::ConsolidateResults;
        }
        if run.iteration >= run.max_iterations {
            warn!(
                run_id = %run.id,
                iterations = run.iteration,
                active = run.active.len(),
                "Iteration limit reached"
            );
            run.errors.push(format!(
                "iteration limit ({}) reached with {} active task(s)",
                run.max_iterations,
                run.active.len()
            ));
            for id in run.active.clone() {
                self.fail_task(run, id, "iteration limit reached").await;
            }
            return Phase::ConsolidateResults;
        }
        if let Some(blocking) = self.find_blocking(run).await {
            run.pending_coordination = Some(blocking);
            return Phase::CoordinateAgents;
        }

        tokio::time::sleep(self.config.monitor_interval()).await;
        Phase::MonitorProgress
    }

    /// First active dependency whose ends sit on different workers and has
    /// not been coordinated yet in this run.
    async fn find_blocking(&self, run: &WorkflowRun) -> Option<Blocking> {
        let store = self.tasks.read().await;
        for id in &run.active {
            let Some(task) = store.get(*id) else { continue };
            let Some(blocked_worker) = task.assigned_to.as_ref() else {
                continue;
            };
            for dep in &task.dependencies {
                if !run.active.contains(dep) || run.coordinated.contains(&(*dep, *id)) {
                    continue;
                }
                let Some(blocking_worker) = store.get(*dep).and_then(|d| d.assigned_to.as_ref())
                else {
                    continue;
                };
                if blocking_worker != blocked_worker {
                    return Some(Blocking {
                        blocked: *id,
                        blocked_worker: blocked_worker.clone(),
                        blocking: *dep,
                        blocking_worker: blocking_worker.clone(),
                    });
                }
            }
        }
        None
    }

    async fn coordinate_agents(&self, run: &mut WorkflowRun) -> Phase {
        let Some(blocking) = run.pending_coordination.take() else {
            return Phase::MonitorProgress;
        };
        run.coordinated.insert((blocking.blocking, blocking.blocked));

        let message = Message::new(
            self.id.clone(),
            blocking.blocked_worker.clone(),
            MessageType::Coordination,
            format!(
                "Task {} is waiting on task {} assigned to {}",
                blocking.blocked, blocking.blocking, blocking.blocking_worker
            ),
        )
        .with_metadata("task_id", json!(blocking.blocked.to_string()))
        .with_metadata("blocking_task", json!(blocking.blocking.to_string()))
        .with_metadata("blocking_worker", json!(blocking.blocking_worker.as_str()));

        if self.hub.send(message).await {
            info!(
                run_id = %run.id,
                blocked = %blocking.blocked,
                blocking = %blocking.blocking,
                worker = %blocking.blocked_worker,
                "Sent coordination message"
            );
        } else {
            run.errors.push(format!(
                "coordination message for task {} was not delivered",
                blocking.blocked
            ));
        }
        Phase::MonitorProgress
    }

    fn consolidate_results(&self, run: &mut WorkflowRun) -> Phase {
        let results = run
            .tasks
            .iter()
            .filter(|id| run.completed.contains(id))
            .filter_map(|id| run.results.get(id));
        run.output = consolidate(results);

        let finished = run.completed.len() + run.failed.len();
        run.success_rate = if finished == 0 {
            0.0
        } else {
            run.completed.len() as f64 / finished as f64
        };
        info!(
            run_id = %run.id,
            completed = run.completed.len(),
            failed = run.failed.len(),
            success_rate = run.success_rate,
            "Results consolidated"
        );
        Phase::CompleteWorkflow
    }

    async fn complete_workflow(&self, run: &mut WorkflowRun) -> Phase {
        let tallies: Vec<TaskTally> = run
            .completed
            .iter()
            .map(|id| (id, true))
            .chain(run.failed.iter().map(|f| (&f.task_id, false)))
            .map(|(id, completed)| TaskTally {
                worker: run.assignments.get(id).cloned(),
                completed,
            })
            .collect();
        let elapsed = (Utc::now() - run.started_at).to_std().unwrap_or_default();
        self.metrics.record_run(elapsed, &tallies).await;

        let purged = self
            .tasks
            .write()
            .await
            .purge_terminal(self.config.task_retention());
        info!(
            run_id = %run.id,
            duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            purged,
            "Coordinator run complete"
        );
        Phase::Finished
    }

    async fn complete_task(&self, run: &mut WorkflowRun, id: Uuid, result: Value) {
        let (accepted, worker) = {
            let mut store = self.tasks.write().await;
            let accepted = store.mark_completed(id, result.clone());
            (accepted, store.get(id).and_then(|t| t.assigned_to.clone()))
        };
        if let Some(worker) = &worker {
            self.directory.remove_task(worker, id).await;
        }
        run.active.retain(|t| *t != id);
        if accepted {
            info!(run_id = %run.id, task_id = %id, "Task completed");
            run.completed.push(id);
            run.results.insert(id, result);
        }
    }

    async fn fail_task(&self, run: &mut WorkflowRun, id: Uuid, reason: impl Into<String>) {
        let reason = reason.into();
        let (accepted, worker) = {
            let mut store = self.tasks.write().await;
            let accepted = store.mark_failed(id, reason.clone());
            (accepted, store.get(id).and_then(|t| t.assigned_to.clone()))
        };
        if let Some(worker) = &worker {
            self.directory.remove_task(worker, id).await;
        }
        self.collaborators.results.forget(id).await;
        run.active.retain(|t| *t != id);
        if accepted {
            warn!(run_id = %run.id, task_id = %id, %reason, "Task failed");
            run.failed.push(FailedTask {
                task_id: id,
                reason,
            });
        }
    }

    /// The task left its worker outside this run (the worker was
    /// unregistered). It counts as failed for the run.
    async fn release_delegated(&self, run: &mut WorkflowRun, task: &Task) {
        if let Some(worker) = &task.assigned_to {
            self.directory.remove_task(worker, task.id).await;
        }
        self.collaborators.results.forget(task.id).await;
        run.active.retain(|t| *t != task.id);
        warn!(run_id = %run.id, task_id = %task.id, "Task delegated away from its worker");
        run.failed.push(FailedTask {
            task_id: task.id,
            reason: DELEGATED_REASON.to_string(),
        });
    }
}
