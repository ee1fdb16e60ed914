use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{AgentId, AgentKind, MessageId, TaskId};

/// Lifecycle and monitoring events published by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Agent lifecycle ────────────────────────────────────────
    AgentRegistered {
        agent_id: AgentId,
        agent_kind: AgentKind,
    },
    AgentStarted {
        agent_id: AgentId,
    },
    AgentStopped {
        agent_id: AgentId,
        /// The worker ignored cancellation and had to be aborted.
        forced: bool,
    },
    AgentFailed {
        agent_id: AgentId,
        reason: String,
    },

    // ── Message lifecycle ──────────────────────────────────────
    MessageQueued {
        message_id: MessageId,
        receiver: AgentId,
    },
    MessageDelivered {
        message_id: MessageId,
        receiver: AgentId,
    },
    MessageConsumed {
        agent_id: AgentId,
        message_id: MessageId,
    },
    DeliverySaturated {
        agent_id: AgentId,
        pending: usize,
    },

    // ── Actions ────────────────────────────────────────────────
    ActionExecuted {
        agent_id: AgentId,
        action_type: String,
        #[serde(default)]
        detail: Value,
    },
    ActionFailed {
        agent_id: AgentId,
        action_type: String,
        error: String,
    },
    /// Published by an agent's `publish_event` action.
    AgentEvent {
        agent_id: AgentId,
        name: String,
        #[serde(default)]
        payload: Value,
    },
    TaskFinished {
        agent_id: AgentId,
        task_id: TaskId,
        status: String,
    },

    // ── System ─────────────────────────────────────────────────
    Shutdown,
}

impl Event {
    /// Agent this event concerns, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::AgentRegistered { agent_id, .. }
            | Event::AgentStarted { agent_id }
            | Event::AgentStopped { agent_id, .. }
            | Event::AgentFailed { agent_id, .. }
            | Event::MessageConsumed { agent_id, .. }
            | Event::DeliverySaturated { agent_id, .. }
            | Event::ActionExecuted { agent_id, .. }
            | Event::ActionFailed { agent_id, .. }
            | Event::AgentEvent { agent_id, .. }
            | Event::TaskFinished { agent_id, .. } => Some(agent_id),
            Event::MessageQueued { receiver, .. } | Event::MessageDelivered { receiver, .. } => {
                Some(receiver)
            }
            Event::Shutdown => None,
        }
    }
}

/// A broadcast-based event bus for system-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
