//! Worker side of the assignment protocol.
//!
//! The coordinator sends a `TaskAssignment` whose content is the task as
//! JSON and whose metadata carries `task_id`. A worker answers through
//! [`MessageHub::send_response`] with a `TaskResult` carrying `task_id` and
//! `outcome` (`success` or `failure`) in its metadata; on success the
//! content is the result as JSON, on failure the error text.

use crate::collaborators::{ResultSource, TaskExecutor};
use crate::directory::Directory;
use crate::hub::MessageHub;
use crate::types::{Message, MessageType, Metadata, Task, TaskOutcome};
use async_trait::async_trait;
use maestro_core::{AgentId, MaestroResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILURE: &str = "failure";

/// Floor for [`HubResultSource`] retention so a short message TTL does not
/// drop results between two polls.
pub const MIN_RESULT_RETENTION: Duration = Duration::from_secs(60);

/// Drives a [`TaskExecutor`] from one worker's mailbox.
pub struct WorkerRuntime {
    id: AgentId,
    hub: Arc<MessageHub>,
    directory: Arc<Directory>,
    executor: Arc<dyn TaskExecutor>,
    /// How long to wait on the mailbox before sending a heartbeat.
    idle_interval: Duration,
}

impl WorkerRuntime {
    pub fn new(
        id: AgentId,
        hub: Arc<MessageHub>,
        directory: Arc<Directory>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            id,
            hub,
            directory,
            executor,
            idle_interval: Duration::from_secs(1),
        }
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Process at most one message, waiting up to `timeout`. Returns whether
    /// a message was handled.
    pub async fn run_once(&self, timeout: Duration) -> bool {
        let Some(message) = self.hub.receive(&self.id, Some(timeout)).await else {
            self.directory.heartbeat(&self.id, None).await;
            return false;
        };
        self.directory.heartbeat(&self.id, None).await;

        match message.message_type {
            MessageType::TaskAssignment => self.handle_assignment(&message).await,
            other => debug!(
                worker = %self.id,
                message_id = %message.id,
                message_type = ?other,
                content = %message.content,
                "Worker received message"
            ),
        }
        true
    }

    async fn handle_assignment(&self, message: &Message) {
        let (outcome, content) = match serde_json::from_str::<Task>(&message.content) {
            Ok(task) => {
                debug!(worker = %self.id, task_id = %task.id, "Executing task");
                match self.executor.execute(&task).await {
                    Ok(value) => (OUTCOME_SUCCESS, value.to_string()),
                    Err(e) => {
                        warn!(worker = %self.id, task_id = %task.id, error = %e, "Task execution failed");
                        (OUTCOME_FAILURE, e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(worker = %self.id, message_id = %message.id, error = %e, "Malformed task assignment");
                (OUTCOME_FAILURE, format!("malformed task assignment: {e}"))
            }
        };

        let mut metadata = Metadata::new();
        if let Some(task_id) = message.metadata.get("task_id") {
            metadata.insert("task_id".to_string(), task_id.clone());
        }
        metadata.insert("outcome".to_string(), Value::String(outcome.to_string()));
        if !self.hub.send_response(message, content, Some(metadata)).await {
            warn!(worker = %self.id, message_id = %message.id, "Failed to deliver task result");
        }
    }

    /// Serve the mailbox until it is closed or the returned handle is aborted.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(worker = %self.id, "Worker runtime started");
            while self.hub.mailbox_size(&self.id).await.is_some() {
                self.run_once(self.idle_interval).await;
            }
            info!(worker = %self.id, "Mailbox closed, worker runtime stopped");
        })
    }
}

/// Reads task results from the coordinator's mailbox.
///
/// Results for other tasks seen while draining are stashed until polled.
/// Forgotten tasks have their stashed result dropped, and a reply that
/// arrives after the fact is discarded on sight. Both kinds of entry are
/// pruned once older than `retention`: the hub's message TTL by default,
/// never less than [`MIN_RESULT_RETENTION`].
pub struct HubResultSource {
    hub: Arc<MessageHub>,
    mailbox: AgentId,
    retention: Duration,
    state: Mutex<ResultState>,
}

#[derive(Default)]
struct ResultState {
    stash: HashMap<Uuid, Stashed>,
    forgotten: HashMap<Uuid, Instant>,
}

struct Stashed {
    sender: AgentId,
    outcome: TaskOutcome,
    received_at: Instant,
}

impl HubResultSource {
    pub fn new(hub: Arc<MessageHub>, mailbox: AgentId) -> Self {
        let retention = hub.message_ttl().max(MIN_RESULT_RETENTION);
        Self {
            hub,
            mailbox,
            retention,
            state: Mutex::new(ResultState::default()),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Results received but not yet polled.
    pub async fn stashed(&self) -> usize {
        self.state.lock().await.stash.len()
    }

    fn outcome_of(message: &Message) -> TaskOutcome {
        match message.metadata.get("outcome").and_then(Value::as_str) {
            Some(OUTCOME_FAILURE) => TaskOutcome::Failure(message.content.clone()),
            _ => TaskOutcome::Success(
                serde_json::from_str(&message.content)
                    .unwrap_or_else(|_| Value::String(message.content.clone())),
            ),
        }
    }
}

#[async_trait]
impl ResultSource for HubResultSource {
    async fn poll(&self, worker: &AgentId, task_id: Uuid) -> MaestroResult<Option<TaskOutcome>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let retention = self.retention;
        state.stash.retain(|_, s| s.received_at.elapsed() < retention);
        state.forgotten.retain(|_, at| at.elapsed() < retention);

        while let Some(message) = self.hub.receive(&self.mailbox, Some(Duration::ZERO)).await {
            match (message.message_type, message.task_id()) {
                (MessageType::TaskResult, Some(id)) => {
                    if state.forgotten.remove(&id).is_some() {
                        debug!(task_id = %id, sender = %message.sender, "Discarded result for forgotten task");
                        continue;
                    }
                    state.stash.insert(
                        id,
                        Stashed {
                            sender: message.sender.clone(),
                            outcome: Self::outcome_of(&message),
                            received_at: Instant::now(),
                        },
                    );
                }
                _ => debug!(
                    mailbox = %self.mailbox,
                    message_id = %message.id,
                    sender = %message.sender,
                    "Ignoring non-result message"
                ),
            }
        }

        match state.stash.remove(&task_id) {
            Some(stashed) if &stashed.sender == worker => Ok(Some(stashed.outcome)),
            Some(stashed) => {
                warn!(task_id = %task_id, expected = %worker, sender = %stashed.sender, "Dropped result from unassigned worker");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn forget(&self, task_id: Uuid) {
        let mut state = self.state.lock().await;
        if state.stash.remove(&task_id).is_none() {
            state.forgotten.insert(task_id, Instant::now());
        }
    }
}
