use maestro_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Tasks handled by one worker across all runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerUtilization {
    pub assigned: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Running totals updated at the end of every coordinator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub runs: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// completed / (completed + failed) over every run so far.
    pub success_rate: f64,
    pub total_run_ms: u64,
    pub average_run_ms: f64,
    pub workers: BTreeMap<AgentId, WorkerUtilization>,
}

/// Outcome of one task, as recorded in the totals.
#[derive(Debug, Clone)]
pub struct TaskTally {
    /// `None` when the task never reached a worker.
    pub worker: Option<AgentId>,
    pub completed: bool,
}

/// Shared accumulator for [`PerformanceMetrics`].
pub struct PerformanceTracker {
    metrics: Arc<RwLock<PerformanceMetrics>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(PerformanceMetrics::default())),
        }
    }

    /// Fold one finished run into the totals.
    pub async fn record_run(&self, duration: Duration, tasks: &[TaskTally]) {
        let mut metrics = self.metrics.write().await;
        metrics.runs += 1;
        metrics.total_run_ms += u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        metrics.average_run_ms = metrics.total_run_ms as f64 / metrics.runs as f64;

        for tally in tasks {
            if tally.completed {
                metrics.tasks_completed += 1;
            } else {
                metrics.tasks_failed += 1;
            }
            if let Some(worker) = &tally.worker {
                let entry = metrics.workers.entry(worker.clone()).or_default();
                entry.assigned += 1;
                if tally.completed {
                    entry.completed += 1;
                } else {
                    entry.failed += 1;
                }
            }
        }

        let finished = metrics.tasks_completed + metrics.tasks_failed;
        if finished > 0 {
            metrics.success_rate = metrics.tasks_completed as f64 / finished as f64;
        }
    }

    pub async fn snapshot(&self) -> PerformanceMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot().await).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}
