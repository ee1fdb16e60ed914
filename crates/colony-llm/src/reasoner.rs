//! The reasoner boundary used by cognitive and hybrid agents.
//!
//! A [`Reasoner`] turns an agent's mental state plus its current perception
//! into a [`DecisionPayload`]. The payload is raw JSON that may have any shape;
//! callers are expected to coerce it.

use async_trait::async_trait;
use colony_core::payload::parse_loose_json;
use colony_core::{ColonyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::{ChatMessage, LlmProvider, LlmRequest};

/// Maximum retry attempts for transient errors (429, 500, 502, 503).
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff (doubles each retry).
const BASE_DELAY_MS: u64 = 1000;

const DEFAULT_SYSTEM_PROMPT: &str = "You are the deliberation module of an autonomous agent in a \
multi-agent system. You receive the agent's beliefs, desires, intentions and its current \
perception as JSON. Reply with JSON only: either a single action object or an array of them. \
Every action has a \"type\": send_message (receiver, performative, content), respond \
(in_response_to, content), update_belief (key, value), publish_event (name, payload), \
complete_task (task_id, result), fail_task (task_id, reason), adopt_desire (desire), \
drop_desire (desire) or execute (description). Reply with [] when nothing needs doing.";

const REFLECT_INSTRUCTIONS: &str = "Reflect on the recent outcomes below. Reply with a JSON \
object: {\"summary\": string, \"desires\": [string] (omit to keep the current desires), \
\"confidence_adjustment\": number added to the current confidence bias, which \
stays between -1 and 1}.";

/// How much effort a decision deserves. Selects the call timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningTier {
    /// Reactive lookups.
    Simple,
    /// High-priority or complex perceptions.
    Deep,
}

impl ReasoningTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningTier::Simple => "simple",
            ReasoningTier::Deep => "deep",
        }
    }
}

impl std::fmt::Display for ReasoningTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the reasoner is shown about an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonerContext {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    pub beliefs: Map<String, Value>,
    pub desires: Vec<String>,
    pub intentions: Vec<String>,
    /// Stimuli of the current cycle (messages and tasks).
    pub perception: Vec<Value>,
    /// Recent action outcomes; populated for reflection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<Value>,
}

/// Raw reasoner output. Any JSON shape, including a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionPayload(pub Value);

impl DecisionPayload {
    pub fn empty() -> Self {
        Self(Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for DecisionPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Produces decisions and reflections for an agent.
#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str {
        "reasoner"
    }

    /// Decide what to do about the current perception.
    async fn decide(&self, ctx: &ReasonerContext, tier: ReasoningTier) -> Result<DecisionPayload>;

    /// Summarize recent outcomes; may propose new desires and a confidence bias.
    async fn reflect(&self, ctx: &ReasonerContext) -> Result<DecisionPayload>;
}

/// A [`Reasoner`] backed by a chat-completion [`LlmProvider`].
pub struct LlmReasoner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    base_delay: Duration,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Retry policy for transient provider errors.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn build_request(&self, prompt: String) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            system: Some(self.system_prompt.clone()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Call the provider with exponential backoff on transient errors.
    async fn complete_with_retry(&self, request: &LlmRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(request).await {
                Ok(resp) => return Ok(resp.text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = retry_after_hint(&e)
                        .map(Duration::from_secs)
                        .unwrap_or(self.base_delay * 2u32.pow(attempt));
                    warn!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract retry-after hint from a RateLimited error (in seconds).
fn retry_after_hint(err: &ColonyError) -> Option<u64> {
    if let ColonyError::RateLimited { retry_after_secs } = err {
        Some(*retry_after_secs)
    } else {
        None
    }
}

/// Interpret model output: JSON when any can be found, otherwise the trimmed text.
pub fn parse_reply(text: &str) -> DecisionPayload {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DecisionPayload::empty();
    }
    match parse_loose_json(trimmed) {
        Some(value) => DecisionPayload(value),
        None => DecisionPayload(Value::String(trimmed.to_string())),
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decide(&self, ctx: &ReasonerContext, tier: ReasoningTier) -> Result<DecisionPayload> {
        let guidance = match tier {
            ReasoningTier::Simple => "Respond with the most direct actions.",
            ReasoningTier::Deep => {
                "This situation is complex or high priority. Weigh the desires and pending \
                 negotiations before choosing actions."
            }
        };
        let prompt = format!("{guidance}\n\n{}", serde_json::to_string_pretty(ctx)?);
        let request = self.build_request(prompt);

        debug!(agent_id = %ctx.agent_id, tier = %tier, "reasoner decide");
        let text = self
            .complete_with_retry(&request)
            .await
            .map_err(|e| match e {
                ColonyError::LlmProvider(msg) => ColonyError::Reasoner(msg),
                other => other,
            })?;
        Ok(parse_reply(&text))
    }

    async fn reflect(&self, ctx: &ReasonerContext) -> Result<DecisionPayload> {
        let prompt = format!(
            "{REFLECT_INSTRUCTIONS}\n\n{}",
            serde_json::to_string_pretty(ctx)?
        );
        let request = self.build_request(prompt);

        debug!(agent_id = %ctx.agent_id, outcomes = ctx.outcomes.len(), "reasoner reflect");
        let text = self
            .complete_with_retry(&request)
            .await
            .map_err(|e| match e {
                ColonyError::LlmProvider(msg) => ColonyError::Reasoner(msg),
                other => other,
            })?;
        Ok(parse_reply(&text))
    }
}
