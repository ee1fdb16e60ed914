use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{AgentId, TaskId};

/// A unit of work that may be assigned to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: String,
    #[serde(default)]
    pub assigned_to: Option<AgentId>,
    pub task_type: String,
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(default)]
    pub payload: Value,
    /// Set once, on completion or failure.
    #[serde(default)]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Contribution of one task of this priority to assessed complexity.
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Low => 0.25,
            Priority::Medium => 0.5,
            Priority::High => 0.75,
            Priority::Critical => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

impl Task {
    /// Create a pending task.
    pub fn new(owner: impl Into<String>, task_type: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            assigned_to: None,
            task_type: task_type.into(),
            priority,
            status: TaskStatus::Pending,
            payload: Value::Null,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assigned(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_to = Some(agent_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// The task as a rule-engine stimulus. `type` is the task type.
    pub fn to_stimulus(&self) -> serde_json::Map<String, Value> {
        let mut stimulus = match &self.payload {
            Value::Null => serde_json::Map::new(),
            other => crate::payload::coerce_record(other.clone()),
        };
        stimulus.insert("type".into(), Value::String(self.task_type.clone()));
        stimulus.insert("id".into(), Value::String(self.id.to_string()));
        stimulus.insert("task_id".into(), Value::String(self.id.to_string()));
        stimulus.insert("priority".into(), Value::String(self.priority.as_str().into()));
        stimulus
    }
}
