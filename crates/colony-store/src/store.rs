use async_trait::async_trait;
use colony_core::{AgentRecord, Message, MessageId, Result, Task, TaskId, TaskStatus};
use serde_json::Value;

/// Durable storage for messages, tasks and agent records.
///
/// Implementations must be safe to call concurrently from every agent worker
/// and the delivery bridge. Transient failures surface as
/// [`colony_core::ColonyError::Store`] so callers can retry them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a message. Saving an id that already exists is a no-op.
    async fn save_message(&self, message: &Message) -> Result<()>;

    /// Undelivered messages for `receiver`, oldest first.
    async fn load_pending_messages(&self, receiver: &str, limit: usize) -> Result<Vec<Message>>;

    /// Flag a message as placed in its receiver's mailbox.
    /// Returns `false` when the id is unknown or was already delivered.
    async fn mark_delivered(&self, id: MessageId) -> Result<bool>;

    /// Number of undelivered messages for `receiver`.
    async fn pending_count(&self, receiver: &str) -> Result<usize>;

    async fn load_message(&self, id: MessageId) -> Result<Option<Message>>;

    /// Insert or replace a task.
    async fn save_task(&self, task: &Task) -> Result<()>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Claim up to `limit` pending tasks assigned to `agent_id`, highest priority
    /// first. Claimed tasks move to `InProgress` and are not returned again.
    async fn load_due_tasks(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>>;

    /// Record a task's result and move it to `status`. Terminal tasks are immutable.
    async fn save_task_result(&self, task_id: TaskId, result: Value, status: TaskStatus)
    -> Result<Task>;

    /// Insert or replace an agent record.
    async fn save_agent(&self, record: &AgentRecord) -> Result<()>;

    async fn load_agents(&self) -> Result<Vec<AgentRecord>>;
}

/// Due-task ordering shared by the backends: priority desc, then oldest first.
pub(crate) fn due_order(a: &Task, b: &Task) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}
