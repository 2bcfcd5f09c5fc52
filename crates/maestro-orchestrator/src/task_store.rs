use crate::types::{Task, TaskStatus};
use chrono::Utc;
use maestro_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Number of tasks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub delegated: usize,
}

/// Task records and their guarded state transitions.
pub struct TaskStore {
    tasks: HashMap<Uuid, Task>,
    /// Insertion order; timestamps alone can tie.
    order: Vec<Uuid>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add a task to the store.
    pub fn add(&mut self, task: Task) -> Uuid {
        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
        id
    }

    fn ordered(&self) -> impl Iterator<Item = &Task> + '_ {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All tasks in insertion order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.ordered().collect()
    }

    /// Tasks created by one coordinator run, in insertion order.
    pub fn tasks_for_run(&self, run_id: Uuid) -> Vec<&Task> {
        self.ordered().filter(|t| t.run_id == Some(run_id)).collect()
    }

    fn transition(&mut self, id: Uuid, next: TaskStatus) -> Option<&mut Task> {
        let task = self.tasks.get_mut(&id)?;
        if !task.status.can_transition_to(next) {
            warn!(
                task_id = %id,
                from = %task.status,
                to = %next,
                "Rejected invalid task transition"
            );
            return None;
        }
        debug!(task_id = %id, from = %task.status, to = %next, "Task transition");
        task.status = next;
        Some(task)
    }

    /// pending → assigned, recording the worker and assignment time.
    pub fn mark_assigned(&mut self, id: Uuid, worker: AgentId) -> bool {
        match self.transition(id, TaskStatus::Assigned) {
            Some(task) => {
                task.assigned_to = Some(worker);
                task.assigned_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// assigned → in_progress.
    pub fn mark_in_progress(&mut self, id: Uuid) -> bool {
        self.transition(id, TaskStatus::InProgress).is_some()
    }

    /// in_progress → completed, storing the result.
    pub fn mark_completed(&mut self, id: Uuid, result: serde_json::Value) -> bool {
        match self.transition(id, TaskStatus::Completed) {
            Some(task) => {
                task.result = Some(result);
                task.completed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Any non-terminal state → failed, with a reason.
    pub fn mark_failed(&mut self, id: Uuid, reason: impl Into<String>) -> bool {
        match self.transition(id, TaskStatus::Failed) {
            Some(task) => {
                task.error = Some(reason.into());
                task.completed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Any non-terminal state → delegated.
    pub fn mark_delegated(&mut self, id: Uuid) -> bool {
        match self.transition(id, TaskStatus::Delegated) {
            Some(task) => {
                task.completed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Tasks currently assigned or in progress.
    pub fn in_flight_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress))
            .count()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Delegated => counts.delegated += 1,
            }
        }
        counts
    }

    /// Drop terminal tasks that finished more than `retention` ago.
    pub fn purge_terminal(&mut self, retention: Duration) -> usize {
        let now = Utc::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, task| {
            let expired = task.status.is_terminal()
                && task.completed_at.is_some_and(|at| {
                    (now - at).to_std().unwrap_or_default() >= retention
                });
            !expired
        });
        let tasks = &self.tasks;
        self.order.retain(|id| tasks.contains_key(id));
        let purged = before - self.tasks.len();
        if purged > 0 {
            debug!(purged, "Purged terminal tasks past retention");
        }
        purged
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker() -> AgentId {
        AgentId::from("w1")
    }

    #[test]
    fn test_empty_store() {
        let store = TaskStore::new();
        assert!(store.all_tasks().is_empty());
        assert_eq!(store.in_flight_count(), 0);
        assert_eq!(store.status_counts(), StatusCounts::default());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut store = TaskStore::new();
        let id = store.add(Task::new("Write parser", "code"));

        assert!(store.mark_assigned(id, worker()));
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_to, Some(worker()));
        assert!(task.assigned_at.is_some());

        assert!(store.mark_in_progress(id));
        assert!(store.mark_completed(id, json!({"code": "fn main() {}"})));
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(json!({"code": "fn main() {}"})));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut store = TaskStore::new();
        let id = store.add(Task::new("Skip ahead", "code"));
        assert!(!store.mark_in_progress(id));
        assert!(!store.mark_completed(id, json!(null)));
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Pending);

        assert!(store.mark_failed(id, "no eligible worker"));
        assert!(!store.mark_assigned(id, worker()));
        assert!(!store.mark_failed(id, "again"));
        assert_eq!(
            store.get(id).unwrap().error.as_deref(),
            Some("no eligible worker")
        );
    }

    #[test]
    fn test_unknown_id() {
        let mut store = TaskStore::new();
        assert!(!store.mark_assigned(Uuid::new_v4(), worker()));
        assert!(!store.mark_failed(Uuid::new_v4(), "x"));
        assert!(store.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_delegation_from_any_non_terminal() {
        let mut store = TaskStore::new();
        let id = store.add(Task::new("Hand off", "research"));
        assert!(store.mark_assigned(id, worker()));
        assert!(store.mark_delegated(id));
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Delegated);
        assert!(!store.mark_in_progress(id));
    }

    #[test]
    fn test_counts_and_in_flight() {
        let mut store = TaskStore::new();
        let a = store.add(Task::new("A", "code"));
        let b = store.add(Task::new("B", "code"));
        store.add(Task::new("C", "code"));
        store.mark_assigned(a, worker());
        store.mark_assigned(b, worker());
        store.mark_in_progress(b);

        assert_eq!(store.in_flight_count(), 2);
        let counts = store.status_counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.assigned, 1);
        assert_eq!(counts.in_progress, 1);
    }

    #[test]
    fn test_tasks_for_run() {
        let mut store = TaskStore::new();
        let run = Uuid::new_v4();
        let mut mine = Task::new("Mine", "code");
        mine.run_id = Some(run);
        let mine = store.add(mine);
        store.add(Task::new("Other", "code"));

        let ids: Vec<Uuid> = store.tasks_for_run(run).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![mine]);
    }

    #[test]
    fn test_purge_terminal() {
        let mut store = TaskStore::new();
        let done = store.add(Task::new("Done", "code"));
        let live = store.add(Task::new("Live", "code"));
        store.mark_failed(done, "timeout");

        assert_eq!(store.purge_terminal(Duration::from_secs(3600)), 0);
        assert_eq!(store.purge_terminal(Duration::ZERO), 1);
        assert!(store.get(done).is_none());
        assert!(store.get(live).is_some());
    }
}
