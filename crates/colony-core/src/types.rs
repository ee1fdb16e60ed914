use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for an agent. Opaque to the runtime.
pub type AgentId = String;

/// Unique identifier for a message.
pub type MessageId = Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// Unique identifier for a conversation thread.
pub type ConversationId = Uuid;

/// How an agent decides what to do each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Stimulus-response only.
    Reflexive,
    /// Every decision goes through the reasoner.
    Cognitive,
    /// Chooses per cycle based on assessed complexity.
    Hybrid,
}

impl AgentKind {
    /// Whether this kind ever calls the reasoner.
    pub fn uses_reasoner(&self) -> bool {
        !matches!(self, AgentKind::Reflexive)
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentKind::Reflexive => "reflexive",
            AgentKind::Cognitive => "cognitive",
            AgentKind::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
    /// Unrecoverable cycle failure. Terminal until the agent is started again.
    Error,
}

impl AgentStatus {
    /// A live execution unit exists in these states.
    pub fn is_live(&self) -> bool {
        matches!(self, AgentStatus::Running | AgentStatus::Stopping)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Stopping => "stopping",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// The mode a cycle was processed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Reflexive,
    Cognitive,
    /// Rules first, reasoner on the remainder.
    Mixed,
}

/// A condition/action pair evaluated by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Structural pattern matched against the stimulus.
    pub condition: Map<String, Value>,
    /// Action template. String values may contain `{field}` placeholders.
    pub action: Value,
}

impl Rule {
    pub fn new(condition: Value, action: Value) -> Self {
        let condition = match condition {
            Value::Object(map) => map,
            other => crate::payload::coerce_record(other),
        };
        Self { condition, action }
    }
}

/// The persistent description of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub role: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Initial beliefs. Afterwards only the agent's own cycle mutates them.
    #[serde(default)]
    pub beliefs: Map<String, Value>,
    #[serde(default)]
    pub desires: Vec<String>,
    #[serde(default)]
    pub intentions: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Complexity threshold for hybrid agents, in [0, 1].
    #[serde(default = "default_threshold")]
    pub cognitive_threshold: f64,
    #[serde(default)]
    pub status: AgentStatus,
}

fn default_threshold() -> f64 {
    0.7
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, kind: AgentKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: String::new(),
            kind,
            capabilities: vec![],
            beliefs: Map::new(),
            desires: vec![],
            intentions: vec![],
            rules: vec![],
            cognitive_threshold: default_threshold(),
            status: AgentStatus::Idle,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.cognitive_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_desires(mut self, desires: &[&str]) -> Self {
        self.desires = desires.iter().map(|d| d.to_string()).collect();
        self
    }
}
