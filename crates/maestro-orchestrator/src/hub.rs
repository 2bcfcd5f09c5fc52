//! Message hub: bounded per-agent mailboxes, broadcast fan-out, typed
//! handler dispatch, request/response correlation and TTL maintenance.
//!
//! Mailbox delivery and handler dispatch are two independent effects of a
//! single [`MessageHub::send`]: a message addressed to an agent is queued in
//! its mailbox *and* passed to every handler that agent registered for the
//! message type. A failing handler affects neither the mailbox nor the
//! other handlers.

use crate::config::OrchestratorConfig;
use crate::types::{Message, MessageType, Metadata, Recipient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maestro_core::{AgentId, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback invoked for messages of selected types sent to one agent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> MaestroResult<()>;
}

/// Counters and gauges describing hub traffic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubStats {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    /// Messages refused by validation.
    pub messages_rejected: u64,
    /// Messages refused because the recipient mailbox was full.
    pub backpressure_rejections: u64,
    pub messages_expired: u64,
    pub handler_invocations: u64,
    pub handler_failures: u64,
    pub mailbox_sizes: BTreeMap<AgentId, usize>,
    /// Mean latency between a message and its response, in milliseconds.
    pub average_response_ms: Option<f64>,
    pub last_maintenance: Option<DateTime<Utc>>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub purged: usize,
    pub mailbox_sizes: BTreeMap<AgentId, usize>,
    pub average_response_ms: Option<f64>,
}

struct Mailbox {
    queue: VecDeque<Message>,
    notify: Arc<Notify>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

struct HandlerEntry {
    agent_id: AgentId,
    types: HashSet<MessageType>,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
struct HubState {
    mailboxes: HashMap<AgentId, Mailbox>,
    /// Every accepted message until it is purged, for response lookup and TTL.
    archive: HashMap<Uuid, Message>,
    /// Original message id -> id of its (single) response.
    responses: HashMap<Uuid, Uuid>,
    handlers: HashMap<Uuid, HandlerEntry>,
    stats: HubStats,
}

impl HubState {
    fn matching_handlers(&self, message: &Message) -> Vec<Arc<dyn MessageHandler>> {
        let Some(recipient) = message.recipient.agent() else {
            return Vec::new();
        };
        self.handlers
            .values()
            .filter(|h| &h.agent_id == recipient && h.types.contains(&message.message_type))
            .map(|h| Arc::clone(&h.handler))
            .collect()
    }

    fn mailbox_sizes(&self) -> BTreeMap<AgentId, usize> {
        self.mailboxes
            .iter()
            .map(|(id, mailbox)| (id.clone(), mailbox.queue.len()))
            .collect()
    }
}

/// In-process exchange for coordinator/worker messages.
pub struct MessageHub {
    state: Mutex<HubState>,
    responses_changed: Notify,
    max_queue_size: usize,
    message_ttl: Duration,
}

impl MessageHub {
    pub fn new(max_queue_size: usize, message_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            responses_changed: Notify::new(),
            max_queue_size: max_queue_size.max(1),
            message_ttl,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.max_queue_size, config.message_ttl())
    }

    pub fn message_ttl(&self) -> Duration {
        self.message_ttl
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Create an empty mailbox for `agent_id` if it has none.
    pub async fn open_mailbox(&self, agent_id: &AgentId) {
        let mut state = self.state.lock().await;
        state
            .mailboxes
            .entry(agent_id.clone())
            .or_insert_with(Mailbox::new);
    }

    /// Drop a mailbox and everything still queued in it.
    pub async fn close_mailbox(&self, agent_id: &AgentId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.mailboxes.remove(agent_id);
        let closed = removed.is_some();
        if let Some(mailbox) = removed {
            // A receiver between its queue check and its wait still gets the permit.
            mailbox.notify.notify_waiters();
            mailbox.notify.notify_one();
            state.handlers.retain(|_, h| &h.agent_id != agent_id);
            debug!(agent = %agent_id, "Closed mailbox");
        }
        closed
    }

    pub async fn mailbox_size(&self, agent_id: &AgentId) -> Option<usize> {
        let state = self.state.lock().await;
        state.mailboxes.get(agent_id).map(|m| m.queue.len())
    }

    /// Validate and deliver a message. Returns `false` when the message is
    /// malformed or every target mailbox is full; never blocks on capacity.
    pub async fn send(&self, message: Message) -> bool {
        if let Err(reason) = validate(&message) {
            warn!(message_id = %message.id, sender = %message.sender, %reason, "Rejected message");
            self.state.lock().await.stats.messages_rejected += 1;
            return false;
        }

        let (delivered, is_response) = {
            let mut state = self.state.lock().await;
            let is_response = message.response_to.is_some();
            let delivered = match message.recipient.clone() {
                Recipient::Agent(recipient) => {
                    match self.enqueue(&mut state, &recipient, message) {
                        Ok(message) => vec![message],
                        Err(()) => return false,
                    }
                }
                Recipient::Broadcast => match self.fan_out(&mut state, message) {
                    Some(messages) => messages,
                    None => return false,
                },
            };
            state.stats.messages_sent += 1;

            let deliveries: Vec<(Message, Vec<Arc<dyn MessageHandler>>)> = delivered
                .into_iter()
                .map(|m| {
                    let handlers = state.matching_handlers(&m);
                    (m, handlers)
                })
                .collect();
            (deliveries, is_response)
        };

        if is_response {
            self.responses_changed.notify_waiters();
        }

        for (message, handlers) in delivered {
            for handler in handlers {
                let result = handler.handle(&message).await;
                let mut state = self.state.lock().await;
                state.stats.handler_invocations += 1;
                if let Err(e) = result {
                    state.stats.handler_failures += 1;
                    warn!(
                        message_id = %message.id,
                        recipient = %message.recipient,
                        error = %e,
                        "Message handler failed"
                    );
                }
            }
        }

        true
    }

    fn enqueue(
        &self,
        state: &mut HubState,
        recipient: &AgentId,
        message: Message,
    ) -> Result<Message, ()> {
        if let Some(original) = message.response_to {
            if state.responses.contains_key(&original) {
                warn!(message_id = %message.id, response_to = %original, "Rejected duplicate response");
                state.stats.messages_rejected += 1;
                return Err(());
            }
        }

        let mailbox = state
            .mailboxes
            .entry(recipient.clone())
            .or_insert_with(Mailbox::new);
        if mailbox.queue.len() >= self.max_queue_size {
            warn!(
                recipient = %recipient,
                capacity = self.max_queue_size,
                "Mailbox full, rejecting message"
            );
            state.stats.backpressure_rejections += 1;
            return Err(());
        }
        mailbox.queue.push_back(message.clone());
        mailbox.notify.notify_one();

        if let Some(original) = message.response_to {
            state.responses.insert(original, message.id);
        }
        state.archive.insert(message.id, message.clone());
        debug!(
            message_id = %message.id,
            sender = %message.sender,
            recipient = %recipient,
            message_type = ?message.message_type,
            "Queued message"
        );
        Ok(message)
    }

    /// Clone a broadcast into every open mailbox except the sender's.
    /// `None` when there were recipients and all of them refused it.
    fn fan_out(&self, state: &mut HubState, message: Message) -> Option<Vec<Message>> {
        let mut recipients: Vec<AgentId> = state
            .mailboxes
            .keys()
            .filter(|id| **id != message.sender)
            .cloned()
            .collect();
        recipients.sort();

        let mut delivered = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let mut copy = message.clone();
            copy.id = Uuid::new_v4();
            copy.recipient = Recipient::Agent(recipient.clone());
            copy.metadata.insert(
                "broadcast_id".to_string(),
                serde_json::Value::String(message.id.to_string()),
            );
            if let Ok(copy) = self.enqueue(state, recipient, copy) {
                delivered.push(copy);
            }
        }

        if !recipients.is_empty() && delivered.is_empty() {
            warn!(message_id = %message.id, "Broadcast refused by every recipient");
            return None;
        }
        debug!(
            message_id = %message.id,
            recipients = recipients.len(),
            delivered = delivered.len(),
            "Broadcast fanned out"
        );
        Some(delivered)
    }

    /// Dequeue the oldest message for `agent_id`, waiting up to `timeout`
    /// (forever when `None`). Returns `None` on timeout, and at once when
    /// `agent_id` has no mailbox or its mailbox is closed while waiting.
    /// Receiving never creates a mailbox.
    pub async fn receive(&self, agent_id: &AgentId, timeout: Option<Duration>) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let notify = {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                let mailbox = state.mailboxes.get_mut(agent_id)?;
                if let Some(mut message) = mailbox.queue.pop_front() {
                    let now = Utc::now();
                    message.delivered_at = Some(now);
                    if let Some(archived) = state.archive.get_mut(&message.id) {
                        archived.delivered_at = Some(now);
                    }
                    state.stats.messages_delivered += 1;
                    return Some(message);
                }
                Arc::clone(&mailbox.notify)
            };

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    // A timeout here just loops back for one last look at the queue.
                    let _ = tokio::time::timeout_at(deadline, notify.notified()).await;
                }
                None => notify.notified().await,
            }
        }
    }

    /// Subscribe `handler` to messages of `types` addressed to `agent_id`.
    pub async fn register_handler(
        &self,
        agent_id: &AgentId,
        types: impl IntoIterator<Item = MessageType>,
        handler: Arc<dyn MessageHandler>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let entry = HandlerEntry {
            agent_id: agent_id.clone(),
            types: types.into_iter().collect(),
            handler,
        };
        debug!(handler_id = %id, agent = %agent_id, types = ?entry.types, "Registered handler");
        self.state.lock().await.handlers.insert(id, entry);
        id
    }

    pub async fn unregister_handler(&self, handler_id: Uuid) -> bool {
        self.state.lock().await.handlers.remove(&handler_id).is_some()
    }

    /// Reply to `original`: the reply goes back to its sender and carries
    /// `response_to = original.id`. At most one response per message.
    pub async fn send_response(
        &self,
        original: &Message,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> bool {
        let Some(responder) = original.recipient.agent() else {
            warn!(message_id = %original.id, "Cannot respond to an unexpanded broadcast");
            return false;
        };
        let message_type = match original.message_type {
            MessageType::TaskAssignment => MessageType::TaskResult,
            _ => MessageType::Direct,
        };
        let mut response = Message::new(
            responder.clone(),
            original.sender.clone(),
            message_type,
            content,
        )
        .with_priority(original.priority)
        .in_response_to(original.id);
        if let Some(metadata) = metadata {
            response.metadata.extend(metadata);
        }
        self.send(response).await
    }

    /// Wait up to `timeout` for the response to `message_id`.
    pub async fn wait_for_response(&self, message_id: Uuid, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.responses_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock().await;
                if let Some(response) = state
                    .responses
                    .get(&message_id)
                    .and_then(|id| state.archive.get(id))
                {
                    return Some(response.clone());
                }
            }

            if Instant::now() >= deadline {
                return None;
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    /// Purge messages older than the TTL or past their expiry, then refresh
    /// mailbox sizes and the average response latency.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let now = Utc::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let ttl = self.message_ttl;
        let is_stale = |m: &Message| {
            let age = (now - m.created_at).to_std().unwrap_or_default();
            age >= ttl || m.expires_at.is_some_and(|at| at <= now)
        };

        let mut purged: HashSet<Uuid> = state
            .archive
            .values()
            .filter(|m| is_stale(m))
            .map(|m| m.id)
            .collect();
        for mailbox in state.mailboxes.values_mut() {
            mailbox.queue.retain(|m| {
                if is_stale(m) {
                    purged.insert(m.id);
                    false
                } else {
                    true
                }
            });
        }
        state.archive.retain(|id, _| !purged.contains(id));
        let archive = &state.archive;
        let retained: HashMap<Uuid, Uuid> = state
            .responses
            .iter()
            .filter(|(original, response)| {
                archive.contains_key(*original) || archive.contains_key(*response)
            })
            .map(|(original, response)| (*original, *response))
            .collect();
        state.responses = retained;

        let mut latencies = Vec::new();
        for message in state.archive.values() {
            if let Some(original) = message.response_to.and_then(|id| state.archive.get(&id)) {
                let latency = (message.created_at - original.created_at).num_microseconds();
                if let Some(us) = latency {
                    latencies.push(us as f64 / 1000.0);
                }
            }
        }
        if !latencies.is_empty() {
            state.stats.average_response_ms =
                Some(latencies.iter().sum::<f64>() / latencies.len() as f64);
        }

        let mailbox_sizes = state.mailbox_sizes();
        state.stats.messages_expired += purged.len() as u64;
        state.stats.mailbox_sizes = mailbox_sizes.clone();
        state.stats.last_maintenance = Some(now);

        if !purged.is_empty() {
            info!(purged = purged.len(), "Hub maintenance purged expired messages");
        }

        MaintenanceReport {
            purged: purged.len(),
            mailbox_sizes,
            average_response_ms: state.stats.average_response_ms,
        }
    }

    /// Run [`MessageHub::run_maintenance`] every `interval` until aborted.
    pub fn spawn_maintenance(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.run_maintenance().await;
            }
        })
    }

    /// Snapshot of hub statistics with live mailbox sizes.
    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.mailbox_sizes = state.mailbox_sizes();
        stats
    }
}

fn validate(message: &Message) -> Result<(), String> {
    if message.sender.is_empty() {
        return Err("empty sender".to_string());
    }
    if let Recipient::Agent(recipient) = &message.recipient {
        if recipient.is_empty() {
            return Err("empty recipient".to_string());
        }
        if *recipient == message.sender {
            return Err("sender and recipient are the same agent".to_string());
        }
    }
    if message.content.trim().is_empty() && message.message_type != MessageType::StatusUpdate {
        return Err("empty content".to_string());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use maestro_core::MaestroError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hub() -> MessageHub {
        MessageHub::new(10, Duration::from_secs(3600))
    }

    fn direct(from: &str, to: &str, content: &str) -> Message {
        Message::new(from, to, MessageType::Direct, content)
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: &Message) -> MaestroResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MaestroError::Worker("handler exploded".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_fifo_per_recipient() {
        let hub = hub();
        let w1 = AgentId::from("w1");
        let m1 = direct("c", "w1", "first");
        let m2 = direct("c", "w1", "second");
        let (id1, id2) = (m1.id, m2.id);
        assert!(hub.send(m1).await);
        assert!(hub.send(m2).await);

        let got1 = hub.receive(&w1, Some(Duration::ZERO)).await.unwrap();
        let got2 = hub.receive(&w1, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(got1.id, id1);
        assert_eq!(got2.id, id2);
        assert!(got1.delivered_at.is_some());
        assert!(hub.receive(&w1, Some(Duration::ZERO)).await.is_none());
    }

    #[tokio::test]
    async fn test_full_mailbox_rejects() {
        let hub = MessageHub::new(2, Duration::from_secs(3600));
        let w1 = AgentId::from("w1");
        assert!(hub.send(direct("c", "w1", "a")).await);
        assert!(hub.send(direct("c", "w1", "b")).await);
        assert!(!hub.send(direct("c", "w1", "c")).await);
        assert_eq!(hub.mailbox_size(&w1).await, Some(2));
        assert_eq!(hub.stats().await.backpressure_rejections, 1);
    }

    #[tokio::test]
    async fn test_validation() {
        let hub = hub();
        assert!(!hub.send(direct("c", "c", "self")).await);
        assert!(!hub.send(direct("", "w1", "no sender")).await);
        assert!(!hub.send(direct("c", "w1", "   ")).await);
        assert!(
            hub.send(Message::new("c", "w1", MessageType::StatusUpdate, ""))
                .await
        );
        assert_eq!(hub.stats().await.messages_rejected, 3);
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = hub();
        for id in ["c", "w1", "w2"] {
            hub.open_mailbox(&AgentId::from(id)).await;
        }
        let message = Message::broadcast("c", MessageType::Coordination, "sync up");
        let original_id = message.id;
        assert!(hub.send(message).await);

        assert_eq!(hub.mailbox_size(&AgentId::from("c")).await, Some(0));
        for id in ["w1", "w2"] {
            let got = hub
                .receive(&AgentId::from(id), Some(Duration::ZERO))
                .await
                .unwrap();
            assert_eq!(got.recipient, Recipient::Agent(AgentId::from(id)));
            assert_ne!(got.id, original_id);
            assert_eq!(
                got.metadata["broadcast_id"],
                serde_json::json!(original_id.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_broadcast_refused_by_all() {
        let hub = MessageHub::new(1, Duration::from_secs(3600));
        assert!(hub.send(direct("c", "w1", "fill")).await);
        assert!(
            !hub.send(Message::broadcast("c", MessageType::Coordination, "x"))
                .await
        );
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let hub = hub();
        let w1 = AgentId::from("w1");
        hub.open_mailbox(&w1).await;
        let started = Instant::now();
        let got = hub.receive(&w1, Some(Duration::from_millis(30))).await;
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_receive_on_unknown_mailbox_does_not_create_it() {
        let hub = hub();
        let ghost = AgentId::from("ghost");
        let started = Instant::now();
        assert!(hub.receive(&ghost, Some(Duration::from_secs(5))).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(hub.mailbox_size(&ghost).await, None);

        // Not a broadcast recipient either.
        let w1 = AgentId::from("w1");
        hub.open_mailbox(&w1).await;
        assert!(hub.send(Message::broadcast("c", MessageType::StatusUpdate, "hi")).await);
        assert_eq!(hub.mailbox_size(&w1).await, Some(1));
        assert_eq!(hub.mailbox_size(&ghost).await, None);
    }

    #[tokio::test]
    async fn test_close_mailbox_releases_waiting_receiver() {
        let hub = Arc::new(hub());
        let w1 = AgentId::from("w1");
        hub.open_mailbox(&w1).await;
        let closer = Arc::clone(&hub);
        let id = w1.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close_mailbox(&id).await;
        });
        assert!(hub.receive(&w1, None).await.is_none());
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let hub = Arc::new(hub());
        hub.open_mailbox(&AgentId::from("w1")).await;
        let sender = Arc::clone(&hub);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(direct("c", "w1", "late")).await;
        });
        let got = hub
            .receive(&AgentId::from("w1"), Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(got.content, "late");
    }

    #[tokio::test]
    async fn test_handlers_and_mailbox_are_independent() {
        let hub = hub();
        let w1 = AgentId::from("w1");
        let ok_calls = Arc::new(AtomicUsize::new(0));
        let bad_calls = Arc::new(AtomicUsize::new(0));
        hub.register_handler(
            &w1,
            [MessageType::Direct],
            Arc::new(CountingHandler { calls: Arc::clone(&bad_calls), fail: true }),
        )
        .await;
        hub.register_handler(
            &w1,
            [MessageType::Direct],
            Arc::new(CountingHandler { calls: Arc::clone(&ok_calls), fail: false }),
        )
        .await;
        let other = hub
            .register_handler(
                &w1,
                [MessageType::Coordination],
                Arc::new(CountingHandler { calls: Arc::clone(&ok_calls), fail: false }),
            )
            .await;

        assert!(hub.send(direct("c", "w1", "hello")).await);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.mailbox_size(&w1).await, Some(1));

        let stats = hub.stats().await;
        assert_eq!(stats.handler_invocations, 2);
        assert_eq!(stats.handler_failures, 1);

        assert!(hub.unregister_handler(other).await);
        assert!(!hub.unregister_handler(other).await);
    }

    #[tokio::test]
    async fn test_send_response_round_trip() {
        let hub = hub();
        let request = direct("c", "w1", "ping").requiring_response();
        let request_id = request.id;
        assert!(hub.send(request.clone()).await);

        assert!(hub.send_response(&request, "pong", None).await);
        let response = hub
            .wait_for_response(request_id, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(response.response_to, Some(request_id));
        assert_eq!(response.sender, AgentId::from("w1"));
        assert_eq!(response.recipient, Recipient::Agent(AgentId::from("c")));

        // Only one response per message.
        assert!(!hub.send_response(&request, "pong again", None).await);
    }

    #[tokio::test]
    async fn test_wait_for_response_times_out() {
        let hub = hub();
        let got = hub
            .wait_for_response(Uuid::new_v4(), Duration::from_millis(20))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_late_response() {
        let hub = Arc::new(hub());
        let request = Message::new("c", "w1", MessageType::TaskAssignment, "work");
        assert!(hub.send(request.clone()).await);

        let responder = Arc::clone(&hub);
        let original = request.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            responder.send_response(&original, "result", None).await;
        });

        let response = hub
            .wait_for_response(request.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.message_type, MessageType::TaskResult);
    }

    #[tokio::test]
    async fn test_zero_ttl_purges_on_next_pass() {
        let hub = MessageHub::new(10, Duration::ZERO);
        let w1 = AgentId::from("w1");
        assert!(hub.send(direct("c", "w1", "ephemeral")).await);
        assert_eq!(hub.mailbox_size(&w1).await, Some(1));

        let report = hub.run_maintenance().await;
        assert_eq!(report.purged, 1);
        assert_eq!(hub.mailbox_size(&w1).await, Some(0));
        assert_eq!(hub.stats().await.messages_expired, 1);
    }

    #[tokio::test]
    async fn test_explicit_expiry_purged() {
        let hub = hub();
        let w1 = AgentId::from("w1");
        assert!(
            hub.send(direct("c", "w1", "short lived").expires_in(Duration::ZERO))
                .await
        );
        assert!(hub.send(direct("c", "w1", "long lived")).await);

        let report = hub.run_maintenance().await;
        assert_eq!(report.purged, 1);
        let left = hub.receive(&w1, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(left.content, "long lived");
    }

    #[tokio::test]
    async fn test_average_response_latency() {
        let hub = hub();
        let request = direct("c", "w1", "ping");
        assert!(hub.send(request.clone()).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hub.send_response(&request, "pong", None).await);

        let report = hub.run_maintenance().await;
        assert_eq!(report.purged, 0);
        assert!(report.average_response_ms.unwrap() >= 10.0);
        assert_eq!(report.mailbox_sizes[&AgentId::from("w1")], 1);
        assert_eq!(report.mailbox_sizes[&AgentId::from("c")], 1);
    }
}
