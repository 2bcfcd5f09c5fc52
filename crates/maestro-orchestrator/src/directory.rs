use crate::config::OrchestratorConfig;
use crate::types::{Metadata, WorkerDescriptor, WorkerRegistration, WorkerStatus};
use chrono::{DateTime, Utc};
use maestro_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Live registry of workers: capabilities, status and load.
///
/// Every operation on an unknown id returns `false`/`None`; the directory
/// never raises. Workers are kept in id order so discovery results are
/// deterministic.
pub struct Directory {
    workers: Arc<RwLock<BTreeMap<AgentId, WorkerDescriptor>>>,
    heartbeat_timeout: Duration,
    max_concurrent_per_agent: usize,
}

/// Per-worker line of a [`HealthReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub id: AgentId,
    pub status: WorkerStatus,
    pub seconds_since_heartbeat: f64,
    pub healthy: bool,
}

/// Result of one [`Directory::check_health`] pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub healthy: usize,
    pub unhealthy: usize,
    pub offline: usize,
    pub workers: Vec<WorkerHealth>,
}

impl HealthReport {
    pub fn offline_ids(&self) -> Vec<AgentId> {
        self.workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Offline)
            .map(|w| w.id.clone())
            .collect()
    }
}

impl Directory {
    pub fn new(heartbeat_timeout: Duration, max_concurrent_per_agent: usize) -> Self {
        Self {
            workers: Arc::new(RwLock::new(BTreeMap::new())),
            heartbeat_timeout,
            max_concurrent_per_agent: max_concurrent_per_agent.max(1),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.heartbeat_timeout(), config.max_concurrent_per_agent)
    }

    pub fn max_concurrent_per_agent(&self) -> usize {
        self.max_concurrent_per_agent
    }

    /// Register a worker and return its id. Re-registering an id replaces it.
    pub async fn register<I, S>(
        &self,
        registration: WorkerRegistration,
        capabilities: I,
        metadata: Metadata,
    ) -> AgentId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = registration
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| AgentId::generate(&registration.worker_type));
        let now = Utc::now();
        let descriptor = WorkerDescriptor {
            id: id.clone(),
            name: registration.name,
            worker_type: registration.worker_type,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            status: WorkerStatus::Idle,
            registered_at: now,
            last_heartbeat: now,
            current_tasks: Vec::new(),
            task_history: Vec::new(),
            metadata,
        };

        let mut workers = self.workers.write().await;
        if workers.contains_key(&id) {
            warn!(worker = %id, "Worker re-registered, replacing previous descriptor");
        }
        info!(
            worker = %id,
            worker_type = %descriptor.worker_type,
            capabilities = ?descriptor.capabilities,
            "Registered worker"
        );
        workers.insert(id.clone(), descriptor);
        id
    }

    pub async fn unregister(&self, id: &AgentId) -> bool {
        let removed = self.workers.write().await.remove(id).is_some();
        if removed {
            info!(worker = %id, "Unregistered worker");
        }
        removed
    }

    pub async fn get(&self, id: &AgentId) -> Option<WorkerDescriptor> {
        self.workers.read().await.get(id).cloned()
    }

    /// Snapshot of all workers in id order.
    pub async fn list(&self) -> Vec<WorkerDescriptor> {
        self.workers.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn find_by_capability(&self, capability: &str) -> Vec<AgentId> {
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|w| w.has_capability(capability))
            .map(|w| w.id.clone())
            .collect()
    }

    pub async fn find_by_type(&self, worker_type: &str) -> Vec<AgentId> {
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|w| w.worker_type == worker_type)
            .map(|w| w.id.clone())
            .collect()
    }

    /// Idle workers that declare every given capability and match the type, if given.
    pub async fn find_available(
        &self,
        capabilities: Option<&[String]>,
        worker_type: Option<&str>,
    ) -> Vec<AgentId> {
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|w| w.status == WorkerStatus::Idle)
            .filter(|w| {
                capabilities.map_or(true, |caps| caps.iter().all(|c| w.has_capability(c)))
            })
            .filter(|w| worker_type.map_or(true, |t| w.worker_type == t))
            .map(|w| w.id.clone())
            .collect()
    }

    /// Workers that can take another task: idle or busy, and below the
    /// per-worker concurrency limit. Sorted by id.
    pub async fn candidates(&self) -> Vec<WorkerDescriptor> {
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|w| self.has_capacity(w))
            .cloned()
            .collect()
    }

    fn has_capacity(&self, worker: &WorkerDescriptor) -> bool {
        matches!(worker.status, WorkerStatus::Idle | WorkerStatus::Busy)
            && worker.load() < self.max_concurrent_per_agent
    }

    /// Set a worker's status. Idle and busy are derived from the task list,
    /// so asking for either re-derives the status instead of forcing it.
    pub async fn update_status(&self, id: &AgentId, status: WorkerStatus) -> bool {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(id) else {
            return false;
        };
        let previous = worker.status;
        match status {
            WorkerStatus::Offline | WorkerStatus::Error => worker.status = status,
            WorkerStatus::Idle | WorkerStatus::Busy => {
                worker.status = WorkerStatus::Idle;
                worker.refresh_status();
            }
        }
        if previous != worker.status {
            debug!(worker = %id, from = %previous, to = %worker.status, "Worker status changed");
        }
        true
    }

    /// Attach a task to a worker. Refused when the worker is unknown, not
    /// accepting work, or already at its concurrency limit.
    pub async fn add_task(&self, id: &AgentId, task_id: Uuid) -> bool {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(id) else {
            return false;
        };
        if !self.has_capacity(worker) {
            debug!(worker = %id, load = worker.load(), status = %worker.status, "Worker cannot take task");
            return false;
        }
        if !worker.current_tasks.contains(&task_id) {
            worker.current_tasks.push(task_id);
        }
        worker.refresh_status();
        true
    }

    /// Detach a task from a worker and record it in the worker's history.
    pub async fn remove_task(&self, id: &AgentId, task_id: Uuid) -> bool {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(id) else {
            return false;
        };
        let before = worker.current_tasks.len();
        worker.current_tasks.retain(|t| *t != task_id);
        let removed = worker.current_tasks.len() != before;
        if removed {
            worker.task_history.push(task_id);
        }
        worker.refresh_status();
        removed
    }

    /// Record a heartbeat; brings an offline worker back online.
    pub async fn heartbeat(&self, id: &AgentId, metadata: Option<Metadata>) -> bool {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(id) else {
            return false;
        };
        worker.last_heartbeat = Utc::now();
        if let Some(metadata) = metadata {
            worker.metadata.extend(metadata);
        }
        if worker.status == WorkerStatus::Offline {
            info!(worker = %id, "Worker back online");
            worker.status = WorkerStatus::Idle;
            worker.refresh_status();
        }
        true
    }

    /// Flip workers whose last heartbeat is older than the timeout to
    /// offline and report the resulting health counts.
    pub async fn check_health(&self) -> HealthReport {
        let now = Utc::now();
        let mut workers = self.workers.write().await;
        let mut report = HealthReport {
            checked_at: now,
            healthy: 0,
            unhealthy: 0,
            offline: 0,
            workers: Vec::with_capacity(workers.len()),
        };

        for worker in workers.values_mut() {
            let since = (now - worker.last_heartbeat).to_std().unwrap_or_default();
            if since > self.heartbeat_timeout && worker.status != WorkerStatus::Offline {
                warn!(
                    worker = %worker.id,
                    seconds_since_heartbeat = since.as_secs_f64(),
                    "Heartbeat timeout, marking worker offline"
                );
                worker.status = WorkerStatus::Offline;
            }

            let healthy = matches!(worker.status, WorkerStatus::Idle | WorkerStatus::Busy);
            match worker.status {
                WorkerStatus::Offline => report.offline += 1,
                WorkerStatus::Error => report.unhealthy += 1,
                WorkerStatus::Idle | WorkerStatus::Busy => report.healthy += 1,
            }
            report.workers.push(WorkerHealth {
                id: worker.id.clone(),
                status: worker.status,
                seconds_since_heartbeat: since.as_secs_f64(),
                healthy,
            });
        }

        report
    }

    /// Run [`Directory::check_health`] every `interval` until the handle is aborted.
    pub fn spawn_health_monitor(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let report = self.check_health().await;
                debug!(
                    healthy = report.healthy,
                    unhealthy = report.unhealthy,
                    offline = report.offline,
                    "Directory health check"
                );
            }
        })
    }
}
