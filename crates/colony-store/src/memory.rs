//! In-process store. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use colony_core::{
    AgentRecord, ColonyError, Message, MessageId, Result, Task, TaskId, TaskStatus,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::store::{Store, due_order};

#[derive(Default)]
struct Inner {
    next_seq: u64,
    /// Insertion sequence → message. Iteration order is arrival order.
    messages: BTreeMap<u64, Message>,
    message_seq: HashMap<MessageId, u64>,
    tasks: HashMap<TaskId, Task>,
    agents: BTreeMap<String, AgentRecord>,
}

/// A [`Store`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total messages held, delivered or not.
    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_message(&self, message: &Message) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.message_seq.contains_key(&message.id) {
            return Ok(());
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.message_seq.insert(message.id, seq);
        inner.messages.insert(seq, message.clone());
        Ok(())
    }

    async fn load_pending_messages(&self, receiver: &str, limit: usize) -> Result<Vec<Message>> {
        let inner = self.inner.lock();
        Ok(inner
            .messages
            .values()
            .filter(|m| !m.delivered && m.receiver == receiver)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(seq) = inner.message_seq.get(&id).copied() else {
            return Ok(false);
        };
        match inner.messages.get_mut(&seq) {
            Some(m) if !m.delivered => {
                m.delivered = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_count(&self, receiver: &str) -> Result<usize> {
        let inner = self.inner.lock();
        Ok(inner
            .messages
            .values()
            .filter(|m| !m.delivered && m.receiver == receiver)
            .count())
    }

    async fn load_message(&self, id: MessageId) -> Result<Option<Message>> {
        let inner = self.inner.lock();
        Ok(inner
            .message_seq
            .get(&id)
            .and_then(|seq| inner.messages.get(seq))
            .cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.inner.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.inner.lock().tasks.get(&id).cloned())
    }

    async fn load_due_tasks(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>> {
        let mut inner = self.inner.lock();
        let mut due: Vec<&mut Task> = inner
            .tasks
            .values_mut()
            .filter(|t| {
                t.status == TaskStatus::Pending && t.assigned_to.as_deref() == Some(agent_id)
            })
            .collect();
        due.sort_by(|a, b| due_order(a, b));

        let now = Utc::now();
        Ok(due
            .into_iter()
            .take(limit)
            .map(|t| {
                t.status = TaskStatus::InProgress;
                t.updated_at = now;
                t.clone()
            })
            .collect())
    }

    async fn save_task_result(
        &self,
        task_id: TaskId,
        result: Value,
        status: TaskStatus,
    ) -> Result<Task> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(ColonyError::TaskNotFound(task_id))?;
        if task.status.is_terminal() {
            return Err(ColonyError::TaskAlreadyTerminal {
                task_id,
                status: task.status.to_string(),
            });
        }
        task.result = Some(result);
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn save_agent(&self, record: &AgentRecord) -> Result<()> {
        self.inner
            .lock()
            .agents
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_agents(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.inner.lock().agents.values().cloned().collect())
    }
}
