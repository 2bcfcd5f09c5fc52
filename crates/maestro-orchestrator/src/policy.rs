//! Pluggable worker-selection policies.
//!
//! A policy sees the task and a snapshot of the workers that can take more
//! work (sorted by id) and picks one of them, or none. Ties on load are
//! broken by the lower worker id so equal inputs give equal answers.

use crate::types::{Task, WorkerDescriptor};
use maestro_core::{AgentId, TaskPriority};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Chooses a worker for a task.
pub trait AssignmentPolicy: Send + Sync {
    /// Registry key, e.g. `capability_match`.
    fn name(&self) -> &str;

    /// `candidates` holds workers with spare capacity, sorted by id.
    fn select(&self, task: &Task, candidates: &[WorkerDescriptor]) -> Option<AgentId>;
}

fn least_loaded<'a, I>(workers: I) -> Option<AgentId>
where
    I: IntoIterator<Item = &'a WorkerDescriptor>,
{
    workers
        .into_iter()
        .min_by(|a, b| a.load().cmp(&b.load()).then_with(|| a.id.cmp(&b.id)))
        .map(|w| w.id.clone())
}

/// Workers sharing a capability with the task, least loaded first; any
/// worker when none match.
#[derive(Debug, Default)]
pub struct CapabilityMatchPolicy;

impl AssignmentPolicy for CapabilityMatchPolicy {
    fn name(&self) -> &str {
        "capability_match"
    }

    fn select(&self, task: &Task, candidates: &[WorkerDescriptor]) -> Option<AgentId> {
        least_loaded(
            candidates
                .iter()
                .filter(|w| w.capability_overlap(&task.required_capabilities) > 0),
        )
        .or_else(|| least_loaded(candidates))
    }
}

/// Least-loaded worker, capabilities ignored.
#[derive(Debug, Default)]
pub struct LoadBalancedPolicy;

impl AssignmentPolicy for LoadBalancedPolicy {
    fn name(&self) -> &str {
        "load_balanced"
    }

    fn select(&self, _task: &Task, candidates: &[WorkerDescriptor]) -> Option<AgentId> {
        least_loaded(candidates)
    }
}

/// Critical tasks go to the most specialised worker regardless of load;
/// everything else is a capability match.
#[derive(Debug, Default)]
pub struct PriorityBasedPolicy {
    specialization: SpecializationPolicy,
}

impl AssignmentPolicy for PriorityBasedPolicy {
    fn name(&self) -> &str {
        "priority_based"
    }

    fn select(&self, task: &Task, candidates: &[WorkerDescriptor]) -> Option<AgentId> {
        if task.priority != TaskPriority::Critical {
            return CapabilityMatchPolicy.select(task, candidates);
        }
        let preferred_type = self.specialization.preferred_type(&task.task_type);
        let score = |w: &WorkerDescriptor| {
            let type_match = preferred_type.is_some_and(|t| w.worker_type == t);
            (w.capability_overlap(&task.required_capabilities), type_match)
        };
        candidates
            .iter()
            // max_by keeps the last maximum; compare ids reversed so the lowest id wins.
            .max_by(|a, b| score(a).cmp(&score(b)).then_with(|| b.id.cmp(&a.id)))
            .map(|w| w.id.clone())
    }
}

/// Maps task types to a preferred worker type; falls back to capability match.
#[derive(Debug)]
pub struct SpecializationPolicy {
    table: HashMap<String, String>,
}

impl SpecializationPolicy {
    pub fn new() -> Self {
        let table = [
            ("code", "coder"),
            ("coding", "coder"),
            ("implementation", "coder"),
            ("research", "researcher"),
            ("analysis", "analyst"),
            ("data", "analyst"),
            ("writing", "writer"),
            ("documentation", "writer"),
            ("review", "reviewer"),
            ("testing", "tester"),
            ("planning", "planner"),
        ]
        .into_iter()
        .map(|(task_type, worker_type)| (task_type.to_string(), worker_type.to_string()))
        .collect();
        Self { table }
    }

    /// Replace the task-type → worker-type table.
    pub fn with_table(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    pub fn preferred_type(&self, task_type: &str) -> Option<&str> {
        self.table
            .get(&task_type.to_lowercase())
            .map(String::as_str)
    }
}

impl Default for SpecializationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentPolicy for SpecializationPolicy {
    fn name(&self) -> &str {
        "specialization"
    }

    fn select(&self, task: &Task, candidates: &[WorkerDescriptor]) -> Option<AgentId> {
        if let Some(worker_type) = self.preferred_type(&task.task_type) {
            if let Some(id) = least_loaded(candidates.iter().filter(|w| w.worker_type == worker_type)) {
                return Some(id);
            }
        }
        CapabilityMatchPolicy.select(task, candidates)
    }
}

/// Name → policy lookup used by the coordinator.
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn AssignmentPolicy>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// A registry holding the four built-in policies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CapabilityMatchPolicy));
        registry.register(Arc::new(LoadBalancedPolicy));
        registry.register(Arc::new(PriorityBasedPolicy::default()));
        registry.register(Arc::new(SpecializationPolicy::new()));
        registry
    }

    pub fn register(&mut self, policy: Arc<dyn AssignmentPolicy>) {
        let name = normalize(policy.name());
        info!(policy = %name, "Registered assignment policy");
        self.policies.insert(name, policy);
    }

    /// Lookup is case-insensitive and treats `-` like `_`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AssignmentPolicy>> {
        self.policies.get(&normalize(name)).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('-', "_")
}
