//! Multi-agent task orchestration core.
//!
//! A free-text request is classified, split into tasks, assigned to
//! registered workers by a pluggable policy, monitored for results and
//! timeouts, and merged into one consolidated answer. Workers talk to the
//! coordinator through bounded per-worker mailboxes.
//!
//! # Main types
//!
//! - [`Orchestrator`]: One directory, hub, task store, coordinator and workflow engine per process.
//! - [`Directory`]: Live registry of workers, their capabilities, load and liveness.
//! - [`MessageHub`]: Bounded mailboxes, broadcast, handlers, TTL maintenance.
//! - [`TaskStore`]: Task records and guarded status transitions.
//! - [`Coordinator`]: The analyze → plan → assign → monitor → consolidate state machine.
//! - [`WorkflowEngine`]: Ordered sequences of coordinator runs.
//! - [`AssignmentPolicy`]: Worker selection, registered by name in a [`PolicyRegistry`].

/// Planner, decomposer, result and executor interfaces with built-in implementations.
pub mod collaborators;
/// TOML-backed configuration.
pub mod config;
/// Coordinator state machine and run reports.
pub mod coordinator;
/// Worker registry.
pub mod directory;
/// Process-level facade and administrative surface.
pub mod engine;
/// Message hub and mailboxes.
pub mod hub;
/// Run and worker performance counters.
pub mod metrics;
/// Assignment policies and their registry.
pub mod policy;
/// Task records and transitions.
pub mod task_store;
/// Shared orchestration types (Task, Message, WorkerDescriptor, etc.).
pub mod types;
/// Worker runtime harness and hub-backed result polling.
pub mod worker;
/// Workflow engine.
pub mod workflow;

pub use collaborators::{
    Complexity, Decomposer, KeywordPlanner, Planner, RequestAnalysis, ResultSource,
    SentenceDecomposer, TaskExecutor,
};
pub use config::OrchestratorConfig;
pub use coordinator::{
    consolidate, Collaborators, Coordinator, FailedTask, Phase, RunReport, WorkflowRun,
    COORDINATOR_ID, DELEGATED_REASON,
};
pub use directory::{Directory, HealthReport, WorkerHealth};
pub use engine::{
    AgentStatusReport, BackgroundTasks, Orchestrator, PerformanceReport, TaskStatusReport,
};
pub use hub::{HubStats, MaintenanceReport, MessageHandler, MessageHub};
pub use metrics::{PerformanceMetrics, PerformanceTracker, TaskTally, WorkerUtilization};
pub use policy::{
    AssignmentPolicy, CapabilityMatchPolicy, LoadBalancedPolicy, PolicyRegistry,
    PriorityBasedPolicy, SpecializationPolicy,
};
pub use task_store::{StatusCounts, TaskStore};
pub use types::{
    Message, MessageType, Metadata, Recipient, Task, TaskOutcome, TaskStatus, WorkerDescriptor,
    WorkerRegistration, WorkerStatus,
};
pub use worker::{HubResultSource, WorkerRuntime, MIN_RESULT_RETENTION};
pub use workflow::{Workflow, WorkflowEngine, WorkflowResult, WorkflowStatus, WorkflowStep};
