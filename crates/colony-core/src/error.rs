use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the entire Colony runtime.
#[derive(Error, Debug)]
pub enum ColonyError {
    // ── Registry errors ────────────────────────────────────────
    #[error("agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("agent already running: {0}")]
    AlreadyRunning(String),

    #[error("agent not running: {0}")]
    NotRunning(String),

    #[error("unknown receiver: {0}")]
    UnknownReceiver(String),

    // ── Delivery errors ────────────────────────────────────────
    #[error("mailbox full: {agent_id} (capacity {capacity})")]
    MailboxFull { agent_id: String, capacity: usize },

    #[error("mailbox closed: {0}")]
    MailboxClosed(String),

    // ── Reasoner / LLM errors ──────────────────────────────────
    #[error("reasoner error: {0}")]
    Reasoner(String),

    #[error("reasoner timed out after {secs}s ({tier} tier)")]
    ReasonerTimeout { tier: String, secs: u64 },

    #[error("no reasoner configured for agent {0}")]
    ReasonerUnavailable(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Cycle-local errors ─────────────────────────────────────
    #[error("rule template failed: rule #{rule}: {reason}")]
    Template { rule: usize, reason: String },

    #[error("malformed deliberation output: {0}")]
    MalformedOutput(String),

    #[error("action failed: {action_type}: {reason}")]
    Action { action_type: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task {task_id} already terminal ({status})")]
    TaskAlreadyTerminal { task_id: Uuid, status: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ColonyError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ColonyError::Store(_)
            | ColonyError::Io(_)
            | ColonyError::RateLimited { .. }
            | ColonyError::MailboxFull { .. } => true,
            ColonyError::LlmProvider(msg) => {
                msg.starts_with("HTTP 429")
                    || msg.starts_with("HTTP 500")
                    || msg.starts_with("HTTP 502")
                    || msg.starts_with("HTTP 503")
                    || msg.contains("timed out")
                    || msg.contains("connection reset")
                    || msg.contains("overloaded")
            }
            _ => false,
        }
    }

    /// Registry errors are returned to administrative callers as-is.
    pub fn is_registry(&self) -> bool {
        matches!(
            self,
            ColonyError::AlreadyRegistered(_)
                | ColonyError::AlreadyRunning(_)
                | ColonyError::NotRunning(_)
                | ColonyError::UnknownReceiver(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ColonyError>;
