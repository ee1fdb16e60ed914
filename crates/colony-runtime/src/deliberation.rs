//! # Deliberation strategies
//!
//! One [`Deliberate`] implementation per agent kind. The worker calls it once
//! per cycle with the cycle's perception and the agent's current state.

use async_trait::async_trait;
use colony_config::{ComplexityWeights, MixedPolicy, RuntimeConfig};
use colony_core::{AgentKind, AgentRecord, ColonyError, ProcessingMode, Result};
use colony_llm::{DecisionPayload, Reasoner, ReasonerContext, ReasoningTier};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::agent::AgentState;
use crate::arbitrator::{assess_complexity, choose_mode, needs_deep_reasoning};
use crate::perception::Perception;
use crate::rules::match_rules;

/// Timeouts applied to reasoner calls, by tier.
#[derive(Debug, Clone, Copy)]
pub struct ReasonerTimeouts {
    pub simple: Duration,
    pub deep: Duration,
}

impl Default for ReasonerTimeouts {
    fn default() -> Self {
        Self {
            simple: Duration::from_secs(10),
            deep: Duration::from_secs(60),
        }
    }
}

impl ReasonerTimeouts {
    pub fn for_tier(&self, tier: ReasoningTier) -> Duration {
        match tier {
            ReasoningTier::Simple => self.simple,
            ReasoningTier::Deep => self.deep,
        }
    }
}

/// Inputs of one deliberation.
pub struct DeliberationInput<'a> {
    pub record: &'a AgentRecord,
    pub state: &'a AgentState,
    pub perception: &'a Perception,
}

/// What a deliberation produced.
#[derive(Debug)]
pub struct Deliberation {
    pub mode: ProcessingMode,
    pub complexity: f64,
    /// Raw action output, normalized by the worker before dispatch.
    pub output: Vec<Value>,
    pub rule_matches: usize,
    pub template_failures: Vec<ColonyError>,
    pub reasoner_called: bool,
    /// A reasoner failure that did not abort the cycle (mixed mode).
    pub reasoner_error: Option<ColonyError>,
}

impl Deliberation {
    fn new(mode: ProcessingMode, complexity: f64) -> Self {
        Self {
            mode,
            complexity,
            output: Vec::new(),
            rule_matches: 0,
            template_failures: Vec::new(),
            reasoner_called: false,
            reasoner_error: None,
        }
    }
}

#[async_trait]
pub trait Deliberate: Send + Sync {
    /// Decide what to do about a perception. An `Err` is a cycle-local error.
    async fn deliberate(&self, input: DeliberationInput<'_>) -> Result<Deliberation>;
}

/// Build the strategy for an agent kind.
pub fn strategy_for(
    kind: AgentKind,
    reasoner: Option<Arc<dyn Reasoner>>,
    config: &RuntimeConfig,
    timeouts: ReasonerTimeouts,
) -> Box<dyn Deliberate> {
    let weights = config.complexity.clone();
    match kind {
        AgentKind::Reflexive => Box::new(ReflexiveStrategy),
        AgentKind::Cognitive => Box::new(CognitiveStrategy {
            reasoner,
            weights,
            timeouts,
            skip_idle: config.skip_idle_reasoning,
        }),
        AgentKind::Hybrid => Box::new(HybridStrategy {
            reasoner,
            weights,
            band: config.hysteresis_band,
            policy: config.mixed_policy,
            timeouts,
        }),
    }
}

// ── Shared helpers ─────────────────────────────────────────────

/// Run the rules over every stimulus. Returns the indices of stimuli no rule matched.
fn apply_rules(input: &DeliberationInput<'_>, out: &mut Deliberation) -> Vec<usize> {
    let mut unmatched = Vec::new();
    for (i, stimulus) in input.perception.stimuli().enumerate() {
        let matches = match_rules(&stimulus.record(), &input.record.rules);
        if matches.is_empty() {
            unmatched.push(i);
        }
        out.rule_matches += matches.matched;
        out.output.extend(matches.actions);
        out.template_failures.extend(matches.failures);
    }
    unmatched
}

fn context(input: &DeliberationInput<'_>, perception: Vec<Value>) -> ReasonerContext {
    ReasonerContext {
        agent_id: input.record.id.clone(),
        role: input.record.role.clone(),
        beliefs: input.state.beliefs.clone(),
        desires: input.state.desires.clone(),
        intentions: input.state.intentions.clone(),
        perception,
        outcomes: Vec::new(),
    }
}

/// Call the reasoner under the tier's timeout.
pub(crate) async fn consult(
    reasoner: Option<&Arc<dyn Reasoner>>,
    agent_id: &str,
    ctx: &ReasonerContext,
    tier: ReasoningTier,
    timeouts: &ReasonerTimeouts,
) -> Result<DecisionPayload> {
    let reasoner = reasoner.ok_or_else(|| ColonyError::ReasonerUnavailable(agent_id.to_string()))?;
    let limit = timeouts.for_tier(tier);
    debug!(agent_id, tier = %tier, stimuli = ctx.perception.len(), "consulting reasoner");
    match tokio::time::timeout(limit, reasoner.decide(ctx, tier)).await {
        Ok(result) => result,
        Err(_) => Err(ColonyError::ReasonerTimeout {
            tier: tier.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

fn tier_for(perception: &Perception, score: f64, threshold: f64) -> ReasoningTier {
    if needs_deep_reasoning(perception, score, threshold) {
        ReasoningTier::Deep
    } else {
        ReasoningTier::Simple
    }
}

// ── Reflexive ──────────────────────────────────────────────────

/// Rules only. Never calls the reasoner.
pub struct ReflexiveStrategy;

#[async_trait]
impl Deliberate for ReflexiveStrategy {
    async fn deliberate(&self, input: DeliberationInput<'_>) -> Result<Deliberation> {
        let mut out = Deliberation::new(ProcessingMode::Reflexive, 0.0);
        apply_rules(&input, &mut out);
        Ok(out)
    }
}

// ── Cognitive ──────────────────────────────────────────────────

/// Every perception goes to the reasoner.
///
/// With `skip_idle` set (`runtime.skip_idle_reasoning`, the default) an empty
/// perception produces no call, so an idle agent spends nothing on the model
/// between messages. Clear it to consult the reasoner on every tick.
pub struct CognitiveStrategy {
    reasoner: Option<Arc<dyn Reasoner>>,
    weights: ComplexityWeights,
    timeouts: ReasonerTimeouts,
    skip_idle: bool,
}

#[async_trait]
impl Deliberate for CognitiveStrategy {
    async fn deliberate(&self, input: DeliberationInput<'_>) -> Result<Deliberation> {
        let score = assess_complexity(input.perception, &self.weights);
        let mut out = Deliberation::new(ProcessingMode::Cognitive, score);
        if self.skip_idle && input.perception.is_empty() {
            return Ok(out);
        }

        let tier = tier_for(
            input.perception,
            score,
            input.record.cognitive_threshold,
        );
        let ctx = context(&input, input.perception.records());
        out.reasoner_called = true;
        let decision = consult(
            self.reasoner.as_ref(),
            &input.record.id,
            &ctx,
            tier,
            &self.timeouts,
        )
        .await?;
        out.output.push(decision.into_inner());
        Ok(out)
    }
}

// ── Hybrid ─────────────────────────────────────────────────────

/// Picks a mode per cycle from the perception's complexity.
pub struct HybridStrategy {
    reasoner: Option<Arc<dyn Reasoner>>,
    weights: ComplexityWeights,
    band: f64,
    policy: MixedPolicy,
    timeouts: ReasonerTimeouts,
}

impl HybridStrategy {
    async fn mixed(&self, input: &DeliberationInput<'_>, out: &mut Deliberation) {
        let threshold = input.record.cognitive_threshold;
        let tier = tier_for(input.perception, out.complexity, threshold);
        match self.policy {
            MixedPolicy::RulesFirst => {
                let unmatched = apply_rules(input, out);
                if unmatched.is_empty() {
                    return;
                }
                let records = input.perception.records();
                let remainder: Vec<Value> = unmatched
                    .into_iter()
                    .filter_map(|i| records.get(i).cloned())
                    .collect();
                let ctx = context(input, remainder);
                out.reasoner_called = true;
                match consult(self.reasoner.as_ref(), &input.record.id, &ctx, tier, &self.timeouts)
                    .await
                {
                    Ok(decision) => out.output.push(decision.into_inner()),
                    Err(e) => out.reasoner_error = Some(e),
                }
            }
            MixedPolicy::ReasonerFirst => {
                let ctx = context(input, input.perception.records());
                out.reasoner_called = true;
                match consult(self.reasoner.as_ref(), &input.record.id, &ctx, tier, &self.timeouts)
                    .await
                {
                    Ok(decision) => out.output.push(decision.into_inner()),
                    Err(e) => {
                        out.reasoner_error = Some(e);
                        apply_rules(input, out);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Deliberate for HybridStrategy {
    async fn deliberate(&self, input: DeliberationInput<'_>) -> Result<Deliberation> {
        if input.perception.is_empty() {
            return Ok(Deliberation::new(ProcessingMode::Reflexive, 0.0));
        }

        let score = assess_complexity(input.perception, &self.weights);
        let mode = choose_mode(score, input.record.cognitive_threshold, self.band);
        let mut out = Deliberation::new(mode, score);
        debug!(agent_id = %input.record.id, complexity = score, mode = ?mode, "arbitrated");

        match mode {
            ProcessingMode::Reflexive => {
                apply_rules(&input, &mut out);
            }
            ProcessingMode::Cognitive => {
                let tier = tier_for(input.perception, score, input.record.cognitive_threshold);
                let ctx = context(&input, input.perception.records());
                out.reasoner_called = true;
                let decision = consult(
                    self.reasoner.as_ref(),
                    &input.record.id,
                    &ctx,
                    tier,
                    &self.timeouts,
                )
                .await?;
                out.output.push(decision.into_inner());
            }
            ProcessingMode::Mixed => self.mixed(&input, &mut out).await,
        }
        Ok(out)
    }
}
