use crate::collaborators::TaskExecutor;
use crate::config::OrchestratorConfig;
use crate::coordinator::{Collaborators, Coordinator, RunReport};
use crate::directory::Directory;
use crate::hub::{HubStats, MessageHub};
use crate::metrics::PerformanceMetrics;
use crate::policy::PolicyRegistry;
use crate::task_store::{StatusCounts, TaskStore};
use crate::types::{Metadata, Task, WorkerDescriptor, WorkerRegistration, WorkerStatus};
use crate::worker::WorkerRuntime;
use crate::workflow::{WorkflowEngine, WorkflowResult, WorkflowStep};
use maestro_core::{AgentId, MaestroResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Worker counts by status plus the full descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub offline: usize,
    pub error: usize,
    pub workers: Vec<WorkerDescriptor>,
}

/// Answer to [`Orchestrator::get_task_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskStatusReport {
    Single { task: Box<Task> },
    Summary { counts: StatusCounts, tasks: Vec<Task> },
}

/// Everything [`Orchestrator::get_performance_metrics`] reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub policy: String,
    pub runs: PerformanceMetrics,
    pub tasks: StatusCounts,
    pub hub: HubStats,
    pub registered_workers: usize,
}

/// Handles of the background maintenance loops. Dropping it stops them.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// One directory, hub, task store, coordinator and workflow engine,
/// wired together for a single process.
pub struct Orchestrator {
    config: OrchestratorConfig,
    directory: Arc<Directory>,
    hub: Arc<MessageHub>,
    tasks: Arc<RwLock<TaskStore>>,
    coordinator: Arc<Coordinator>,
    workflows: WorkflowEngine,
}

impl Orchestrator {
    /// Built-in policies and collaborators.
    pub fn new(config: OrchestratorConfig) -> MaestroResult<Self> {
        Self::build(config, &PolicyRegistry::with_builtins(), Collaborators::builtin)
    }

    /// Custom policies and collaborators. `collaborators` receives the hub
    /// so it can read results from the coordinator's mailbox.
    pub fn build<F>(
        config: OrchestratorConfig,
        policies: &PolicyRegistry,
        collaborators: F,
    ) -> MaestroResult<Self>
    where
        F: FnOnce(Arc<MessageHub>) -> Collaborators,
    {
        config.validate()?;
        let directory = Arc::new(Directory::from_config(&config));
        let hub = Arc::new(MessageHub::from_config(&config));
        let tasks = Arc::new(RwLock::new(TaskStore::new()));
        let coordinator = Arc::new(Coordinator::new(
            config.clone(),
            Arc::clone(&directory),
            Arc::clone(&hub),
            Arc::clone(&tasks),
            policies,
            collaborators(Arc::clone(&hub)),
        )?);
        let workflows = WorkflowEngine::new(Arc::clone(&coordinator));
        info!(
            policy = coordinator.policy_name(),
            max_concurrent_tasks = config.max_concurrent_tasks,
            "Orchestrator initialized"
        );
        Ok(Self {
            config,
            directory,
            hub,
            tasks,
            coordinator,
            workflows,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn hub(&self) -> &Arc<MessageHub> {
        &self.hub
    }

    pub fn tasks(&self) -> &Arc<RwLock<TaskStore>> {
        &self.tasks
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Register a worker and open its mailbox.
    pub async fn register_worker<I, S>(
        &self,
        registration: WorkerRegistration,
        capabilities: I,
        metadata: Metadata,
    ) -> AgentId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self
            .directory
            .register(registration, capabilities, metadata)
            .await;
        self.hub.open_mailbox(&id).await;
        id
    }

    /// Remove a worker and close its mailbox. Tasks it still held are
    /// marked delegated; the run that owns them reports them as failed.
    pub async fn unregister_worker(&self, id: &AgentId) -> bool {
        self.hub.close_mailbox(id).await;
        if let Some(worker) = self.directory.get(id).await {
            let mut store = self.tasks.write().await;
            for task_id in &worker.current_tasks {
                if store.mark_delegated(*task_id) {
                    info!(worker = %id, task_id = %task_id, "Task delegated from unregistered worker");
                }
            }
        }
        self.directory.unregister(id).await
    }

    /// Register a worker and serve its mailbox with `executor`.
    pub async fn spawn_worker<I, S>(
        &self,
        registration: WorkerRegistration,
        capabilities: I,
        executor: Arc<dyn TaskExecutor>,
    ) -> (AgentId, JoinHandle<()>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self
            .register_worker(registration, capabilities, Metadata::new())
            .await;
        let runtime = WorkerRuntime::new(
            id.clone(),
            Arc::clone(&self.hub),
            Arc::clone(&self.directory),
            executor,
        )
        .with_idle_interval(self.config.monitor_interval());
        (id, runtime.spawn())
    }

    /// Run one request through the coordinator.
    pub async fn process_request(&self, request: &str, context: Metadata) -> MaestroResult<RunReport> {
        self.coordinator.run(request, context).await
    }

    /// Start hub maintenance and directory health checks.
    pub fn start_background(&self) -> BackgroundTasks {
        let handles = vec![
            Arc::clone(&self.hub).spawn_maintenance(self.config.maintenance_interval()),
            Arc::clone(&self.directory).spawn_health_monitor(self.config.health_check_interval()),
        ];
        info!(
            maintenance_interval_s = self.config.maintenance_interval_seconds,
            health_check_interval_s = self.config.health_check_interval_seconds,
            "Background loops started"
        );
        BackgroundTasks { handles }
    }

    pub async fn get_agent_status(&self) -> AgentStatusReport {
        let workers = self.directory.list().await;
        let count = |status: WorkerStatus| workers.iter().filter(|w| w.status == status).count();
        AgentStatusReport {
            total: workers.len(),
            idle: count(WorkerStatus::Idle),
            busy: count(WorkerStatus::Busy),
            offline: count(WorkerStatus::Offline),
            error: count(WorkerStatus::Error),
            workers,
        }
    }

    /// One task by id (`None` if unknown), or a summary of every task.
    pub async fn get_task_status(&self, task_id: Option<Uuid>) -> Option<TaskStatusReport> {
        let store = self.tasks.read().await;
        match task_id {
            Some(id) => store.get(id).map(|task| TaskStatusReport::Single {
                task: Box::new(task.clone()),
            }),
            None => Some(TaskStatusReport::Summary {
                counts: store.status_counts(),
                tasks: store.all_tasks().into_iter().cloned().collect(),
            }),
        }
    }

    /// Tasks one coordinator run created, in plan order. Empty once they
    /// are purged or for an unknown run.
    pub async fn get_run_tasks(&self, run_id: Uuid) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .tasks_for_run(run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_performance_metrics(&self) -> PerformanceReport {
        PerformanceReport {
            policy: self.coordinator.policy_name().to_string(),
            runs: self.coordinator.metrics().snapshot().await,
            tasks: self.tasks.read().await.status_counts(),
            hub: self.hub.stats().await,
            registered_workers: self.directory.count().await,
        }
    }

    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        steps: Vec<WorkflowStep>,
    ) -> MaestroResult<Uuid> {
        self.workflows.create(name, description, steps).await
    }

    pub async fn execute_workflow(
        &self,
        id: Uuid,
        context: Option<Metadata>,
    ) -> MaestroResult<WorkflowResult> {
        self.workflows.execute(id, context).await
    }

    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }
}
