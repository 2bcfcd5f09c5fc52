use chrono::{DateTime, Utc};
use maestro_core::{AgentId, MessagePriority, TaskPriority};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use uuid::Uuid;

/// Free-form key/value bag attached to workers, messages and tasks.
pub type Metadata = HashMap<String, serde_json::Value>;

// --- Workers ---

/// Liveness/occupancy of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Busy => write!(f, "busy"),
            WorkerStatus::Offline => write!(f, "offline"),
            WorkerStatus::Error => write!(f, "error"),
        }
    }
}

/// Everything the directory knows about one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: AgentId,
    pub name: String,
    /// Worker-type tag, e.g. `coder` or `researcher`.
    pub worker_type: String,
    pub capabilities: BTreeSet<String>,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_tasks: Vec<Uuid>,
    pub task_history: Vec<Uuid>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl WorkerDescriptor {
    /// Number of tasks the worker is currently holding.
    pub fn load(&self) -> usize {
        self.current_tasks.len()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Number of `required` capabilities this worker declares.
    pub fn capability_overlap(&self, required: &[String]) -> usize {
        required
            .iter()
            .filter(|c| self.capabilities.contains(c.as_str()))
            .count()
    }

    /// Idle/busy derived from the current task list; offline and error are sticky.
    pub(crate) fn refresh_status(&mut self) {
        if matches!(self.status, WorkerStatus::Idle | WorkerStatus::Busy) {
            self.status = if self.current_tasks.is_empty() {
                WorkerStatus::Idle
            } else {
                WorkerStatus::Busy
            };
        }
    }
}

/// Input for [`crate::Directory::register`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRegistration {
    /// Caller-chosen id; a fresh one is generated from the worker type when absent.
    pub id: Option<AgentId>,
    pub name: String,
    pub worker_type: String,
}

impl WorkerRegistration {
    pub fn new(name: impl Into<String>, worker_type: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            worker_type: worker_type.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

// --- Tasks ---

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Delegated,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Delegated
        )
    }

    /// Allowed edges: pending→assigned→in_progress→completed, and any
    /// non-terminal state→failed or →delegated.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Assigned => self == TaskStatus::Pending,
            TaskStatus::InProgress => self == TaskStatus::Assigned,
            TaskStatus::Completed => self == TaskStatus::InProgress,
            TaskStatus::Failed | TaskStatus::Delegated => true,
            TaskStatus::Pending => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Delegated => write!(f, "delegated"),
        }
    }
}

/// A unit of work created by the coordinator during planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub task_type: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_to: Option<AgentId>,
    pub required_capabilities: Vec<String>,
    pub dependencies: Vec<Uuid>,
    #[serde(default)]
    pub context: Metadata,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout: Option<Duration>,
    /// Coordinator run that created this task.
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

impl Task {
    pub fn new(description: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            task_type: task_type.into(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Pending,
            assigned_to: None,
            required_capabilities: Vec::new(),
            dependencies: Vec::new(),
            context: Metadata::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
            timeout: None,
            run_id: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_context(mut self, context: Metadata) -> Self {
        self.context = context;
        self
    }

    /// Whether the task has outlived its timeout since assignment.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match (self.assigned_at, self.timeout) {
            (Some(assigned_at), Some(timeout)) => {
                let elapsed = (now - assigned_at).to_std().unwrap_or_default();
                elapsed > timeout
            }
            _ => false,
        }
    }
}

/// What a worker reported back for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "lowercase")]
pub enum TaskOutcome {
    Success(serde_json::Value),
    Failure(String),
}

// --- Messages ---

/// Kind of a hub message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    TaskResult,
    Coordination,
    StatusUpdate,
    ResourceRequest,
    Direct,
}

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Agent(AgentId),
    /// Fan out to every open mailbox except the sender's.
    Broadcast,
}

impl Recipient {
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            Recipient::Agent(id) => Some(id),
            Recipient::Broadcast => None,
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Agent(id) => write!(f, "{id}"),
            Recipient::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A control or result message exchanged through the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: AgentId,
    pub recipient: Recipient,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub response_to: Option<Uuid>,
    pub requires_response: bool,
    /// Set when the recipient dequeues the message.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self::build(
            sender.into(),
            Recipient::Agent(recipient.into()),
            message_type,
            content.into(),
        )
    }

    pub fn broadcast(
        sender: impl Into<AgentId>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self::build(sender.into(), Recipient::Broadcast, message_type, content.into())
    }

    fn build(
        sender: AgentId,
        recipient: Recipient,
        message_type: MessageType,
        content: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            message_type,
            priority: MessagePriority::Normal,
            content,
            metadata: Metadata::new(),
            created_at: Utc::now(),
            expires_at: None,
            response_to: None,
            requires_response: false,
            delivered_at: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    pub fn in_response_to(mut self, original: Uuid) -> Self {
        self.response_to = Some(original);
        self
    }

    /// Task id carried in the `task_id` metadata key, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        self.metadata
            .get("task_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}
