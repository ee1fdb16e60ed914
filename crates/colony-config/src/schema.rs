use colony_core::{AgentKind, AgentRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, mapped from `colony.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    pub runtime: RuntimeConfig,
    pub bridge: BridgeConfig,
    pub reasoner: ReasonerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    /// Agents registered and started by `colony run`.
    pub agents: Vec<AgentRecord>,
}

// ── Runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bounded mailbox size per agent.
    pub mailbox_capacity: usize,
    /// Maximum messages drained from the mailbox per cycle.
    pub perceive_batch: usize,
    /// Maximum due tasks claimed from the store per cycle.
    pub task_batch: usize,
    /// Longest an idle cycle waits for mail before proceeding with an empty perception.
    pub tick_interval_ms: u64,
    /// Reflection runs every N cycles (cognitive and hybrid agents only). 0 disables it.
    pub reflect_every: u64,
    /// Number of leading desires committed as intentions.
    pub max_intentions: usize,
    /// Width of the mixed band just below a hybrid agent's threshold.
    pub hysteresis_band: f64,
    /// Precedence between rules and reasoner in mixed mode.
    pub mixed_policy: MixedPolicy,
    /// Rolling window for the agent-fatal error count.
    pub error_window_secs: u64,
    /// Errors tolerated inside the window before the agent enters `Error`.
    pub max_errors_in_window: usize,
    /// Consecutive reasoner failures tolerated before the agent enters `Error`.
    pub reasoner_retry_budget: u32,
    /// How long `stop` waits for a worker before aborting it.
    pub stop_grace_ms: u64,
    /// Recently seen message ids remembered per agent for duplicate suppression.
    pub dedup_capacity: usize,
    /// Recent action outcomes kept for reflection.
    pub outcome_history: usize,
    /// Event bus buffer size.
    pub event_capacity: usize,
    /// Cognitive agents skip the reasoner on ticks with nothing perceived.
    pub skip_idle_reasoning: bool,
    pub complexity: ComplexityWeights,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 100,
            perceive_batch: 10,
            task_batch: 5,
            tick_interval_ms: 500,
            reflect_every: 10,
            max_intentions: 3,
            hysteresis_band: 0.05,
            mixed_policy: MixedPolicy::RulesFirst,
            error_window_secs: 60,
            max_errors_in_window: 10,
            reasoner_retry_budget: 3,
            stop_grace_ms: 5_000,
            dedup_capacity: 1_024,
            outcome_history: 50,
            event_capacity: 4_096,
            skip_idle_reasoning: true,
            complexity: ComplexityWeights::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn error_window(&self) -> Duration {
        Duration::from_secs(self.error_window_secs)
    }
}

/// What a hybrid agent does when its complexity lands in the mixed band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedPolicy {
    /// Rules fire first; the reasoner only sees stimuli no rule matched.
    #[default]
    RulesFirst,
    /// The reasoner sees everything; rules are the fallback when it fails.
    ReasonerFirst,
}

/// Caps and weights of the complexity contributors. Each contributor is
/// `min(raw / cap, 1) * weight`; the sum is clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    pub message_cap: f64,
    pub message_weight: f64,
    /// Cap on the summed priority weights of perceived tasks.
    pub task_cap: f64,
    pub task_weight: f64,
    pub complex_type_cap: f64,
    pub complex_type_weight: f64,
    pub negotiation_cap: f64,
    pub negotiation_weight: f64,
    /// Task types that count as complex.
    pub complex_task_types: Vec<String>,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            message_cap: 5.0,
            message_weight: 0.25,
            task_cap: 2.0,
            task_weight: 0.30,
            complex_type_cap: 2.0,
            complex_type_weight: 0.15,
            negotiation_cap: 3.0,
            negotiation_weight: 0.30,
            complex_task_types: vec![
                "analysis".into(),
                "planning".into(),
                "negotiation".into(),
                "research".into(),
                "reasoning".into(),
            ],
        }
    }
}

// ── Delivery bridge ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
    /// Pending messages loaded per agent per tick.
    pub batch_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            batch_size: 50,
        }
    }
}

impl BridgeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

// ── Reasoner ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// "openai", "mock", or "none".
    pub provider: String,
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// Falls back to OPENAI_API_KEY when unset.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries on transient provider errors.
    pub max_retries: u32,
    /// Timeout for simple, reactive lookups.
    pub simple_timeout_secs: u64,
    /// Timeout for deep reasoning (high-priority or complex perceptions).
    pub deep_timeout_secs: u64,
    /// Overrides the built-in system prompt.
    pub system_prompt: Option<String>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            provider: "mock".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            max_tokens: 1_024,
            temperature: 0.2,
            max_retries: 3,
            simple_timeout_secs: 10,
            deep_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl ReasonerConfig {
    pub fn simple_timeout(&self) -> Duration {
        Duration::from_secs(self.simple_timeout_secs)
    }

    pub fn deep_timeout(&self) -> Duration {
        Duration::from_secs(self.deep_timeout_secs)
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// "sqlite" or "memory".
    pub backend: String,
    /// SQLite database path. Relative paths resolve under ~/.colony/.
    pub path: PathBuf,
    /// Attempts per store call before giving up.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff (doubles each retry).
    pub retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            path: PathBuf::from("colony.db"),
            retry_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Default for root ───────────────────────────────────────────

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            bridge: BridgeConfig::default(),
            reasoner: ReasonerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            agents: vec![],
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ColonyConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Runtime ───
        if self.runtime.mailbox_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.mailbox_capacity".into(),
                message: "mailbox capacity is 0 — no message could ever be delivered".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 100".into()),
            });
        }
        if self.runtime.perceive_batch == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.perceive_batch".into(),
                message: "perceive batch is 0 — agents would never read their mailbox".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }
        if self.runtime.tick_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.tick_interval_ms".into(),
                message: "tick interval is 0 — idle agents would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 500".into()),
            });
        }
        if !(0.0..=0.5).contains(&self.runtime.hysteresis_band) {
            warnings.push(ConfigWarning {
                field: "runtime.hysteresis_band".into(),
                message: format!("band {} is out of range", self.runtime.hysteresis_band),
                severity: WarningSeverity::Error,
                hint: Some("The band must be between 0.0 and 0.5; 0.05 is typical".into()),
            });
        } else if self.runtime.hysteresis_band == 0.0 {
            warnings.push(ConfigWarning {
                field: "runtime.hysteresis_band".into(),
                message: "band is 0 — hybrid agents never use mixed mode".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }
        if self.runtime.max_errors_in_window == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.max_errors_in_window".into(),
                message: "a single cycle error will put an agent into the error state".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 10".into()),
            });
        }

        // ── Bridge ───
        if self.bridge.enabled {
            if self.bridge.batch_size == 0 {
                warnings.push(ConfigWarning {
                    field: "bridge.batch_size".into(),
                    message: "batch size is 0 — stored messages would never be delivered".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Set to e.g. 50".into()),
                });
            }
            if self.bridge.interval_ms > 10_000 {
                warnings.push(ConfigWarning {
                    field: "bridge.interval_ms".into(),
                    message: format!(
                        "poll interval {}ms delays delivery to agents that were offline",
                        self.bridge.interval_ms
                    ),
                    severity: WarningSeverity::Warning,
                    hint: Some("A few seconds at most is typical".into()),
                });
            }
        }

        // ── Reasoner ───
        let valid_providers = ["openai", "mock", "none"];
        if !valid_providers.contains(&self.reasoner.provider.as_str()) {
            warnings.push(ConfigWarning {
                field: "reasoner.provider".into(),
                message: format!("unknown provider '{}'", self.reasoner.provider),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", valid_providers.join(", "))),
            });
        }
        if self.reasoner.provider != "none" && self.reasoner.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "reasoner.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'gpt-4o-mini'".into()),
            });
        }
        if self.reasoner.provider == "openai" && self.reasoner.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "reasoner.api_key".into(),
                message: "no API key configured".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set reasoner.api_key or OPENAI_API_KEY".into()),
            });
        }
        if self.reasoner.simple_timeout_secs == 0 || self.reasoner.deep_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "reasoner.timeouts".into(),
                message: "a reasoner timeout is 0 — every call would time out".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        } else if self.reasoner.simple_timeout_secs > self.reasoner.deep_timeout_secs {
            warnings.push(ConfigWarning {
                field: "reasoner.simple_timeout_secs".into(),
                message: "simple timeout is longer than the deep timeout".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Store ───
        let valid_backends = ["sqlite", "memory"];
        if !valid_backends.contains(&self.store.backend.as_str()) {
            warnings.push(ConfigWarning {
                field: "store.backend".into(),
                message: format!("unknown backend '{}'", self.store.backend),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", valid_backends.join(", "))),
            });
        } else if self.store.backend == "memory" {
            warnings.push(ConfigWarning {
                field: "store.backend".into(),
                message: "in-memory store — pending messages are lost on restart".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Agents ───
        let mut seen = HashSet::new();
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.id.trim().is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("agents[{}].id", i),
                    message: "agent id is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            } else if !seen.insert(agent.id.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("agents[{}].id", i),
                    message: format!("duplicate agent id '{}'", agent.id),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if !(0.0..=1.0).contains(&agent.cognitive_threshold) {
                warnings.push(ConfigWarning {
                    field: format!("agents.{}.cognitive_threshold", agent.id),
                    message: format!("threshold {} is out of range", agent.cognitive_threshold),
                    severity: WarningSeverity::Error,
                    hint: Some("Thresholds must be between 0.0 and 1.0".into()),
                });
            }
            if agent.kind.uses_reasoner() && self.reasoner.provider == "none" {
                warnings.push(ConfigWarning {
                    field: format!("agents.{}.kind", agent.id),
                    message: format!("{} agent configured without a reasoner", agent.kind),
                    severity: WarningSeverity::Warning,
                    hint: Some("Set reasoner.provider, or make the agent reflexive".into()),
                });
            }
            if agent.kind == AgentKind::Reflexive && agent.rules.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("agents.{}.rules", agent.id),
                    message: "reflexive agent has no rules and will never act".into(),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
