//! # Agent worker
//!
//! One tokio task per live agent runs the BDI cycle:
//!
//! ```text
//!   perceive ─▶ update beliefs ─▶ deliberate ─▶ act ─▶ reflect ─▶ commit
//!      ▲                                                              │
//!      └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker suspends only on the mailbox wait and on reasoner calls; both
//! are raced against the agent's cancellation token. Any cycle error is
//! caught at the cycle boundary, logged, and counted.

use chrono::{DateTime, Utc};
use colony_config::RuntimeConfig;
use colony_core::payload::{coerce_f64, coerce_record, coerce_string_list};
use colony_core::{
    AgentId, AgentKind, AgentRecord, ColonyError, Event, Message, MessageId, Performative,
    ProcessingMode, Result,
};
use colony_llm::{Reasoner, ReasonerContext, ReasoningTier};
use colony_store::retry_with_backoff;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::{ActionContext, dispatch, normalize_actions};
use crate::deliberation::{Deliberate, DeliberationInput, ReasonerTimeouts};
use crate::metrics::AgentMetrics;
use crate::perception::Perception;
use crate::supervisor::Runtime;

/// The mutable mental state owned by an agent's cycle.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub beliefs: Map<String, Value>,
    pub desires: Vec<String>,
    pub intentions: Vec<String>,
    /// Adjusted by reflection, in [-1, 1].
    pub confidence_bias: f64,
}

impl AgentState {
    pub fn from_record(record: &AgentRecord) -> Self {
        Self {
            beliefs: record.beliefs.clone(),
            desires: record.desires.clone(),
            intentions: record.intentions.clone(),
            confidence_bias: 0.0,
        }
    }

    /// Commit the leading desires as intentions.
    pub fn recompute_intentions(&mut self, max: usize) {
        self.intentions = self.desires.iter().take(max).cloned().collect();
    }

    /// Merge what the perceived messages tell us. Last write wins.
    pub fn absorb(&mut self, messages: &[Message]) {
        for message in messages {
            if message.performative != Performative::Inform {
                continue;
            }
            let observation = coerce_record(message.content.clone());
            self.beliefs.extend(observation);
        }
    }
}

/// A read-only copy of an agent's state, published after every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct BdiSnapshot {
    pub agent_id: AgentId,
    pub kind: AgentKind,
    pub beliefs: Map<String, Value>,
    pub desires: Vec<String>,
    pub intentions: Vec<String>,
    pub confidence_bias: f64,
    pub last_mode: Option<ProcessingMode>,
    pub last_complexity: f64,
    pub cycle: u64,
    pub updated_at: DateTime<Utc>,
}

impl BdiSnapshot {
    pub fn initial(record: &AgentRecord) -> Self {
        Self {
            agent_id: record.id.clone(),
            kind: record.kind,
            beliefs: record.beliefs.clone(),
            desires: record.desires.clone(),
            intentions: record.intentions.clone(),
            confidence_bias: 0.0,
            last_mode: None,
            last_complexity: 0.0,
            cycle: 0,
            updated_at: Utc::now(),
        }
    }
}

// ── Bookkeeping ────────────────────────────────────────────────

/// Bounded memory of recently handled message ids.
pub(crate) struct SeenSet {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
    capacity: usize,
}

impl SeenSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember `id`. Returns `false` if it was already known.
    pub(crate) fn insert(&mut self, id: MessageId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }
}

/// Errors counted over a rolling window.
pub(crate) struct ErrorWindow {
    window: Duration,
    limit: usize,
    hits: VecDeque<Instant>,
}

impl ErrorWindow {
    pub(crate) fn new(window: Duration, limit: usize) -> Self {
        Self {
            window,
            limit,
            hits: VecDeque::new(),
        }
    }

    /// Record an error now. Returns `true` once the window holds more than the limit.
    pub(crate) fn record(&mut self) -> bool {
        let now = Instant::now();
        self.hits.push_back(now);
        while let Some(first) = self.hits.front() {
            if now.duration_since(*first) > self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        self.hits.len() > self.limit
    }
}

enum Flow {
    Continue,
    Stop,
}

// ── Worker ─────────────────────────────────────────────────────

pub(crate) struct AgentWorker {
    pub record: AgentRecord,
    pub generation: u64,
    pub state: AgentState,
    pub rx: mpsc::Receiver<Message>,
    pub runtime: Runtime,
    pub strategy: Box<dyn Deliberate>,
    pub reasoner: Option<Arc<dyn Reasoner>>,
    pub timeouts: ReasonerTimeouts,
    pub config: RuntimeConfig,
    pub metrics: Arc<AgentMetrics>,
    pub snapshot: Arc<RwLock<BdiSnapshot>>,
    pub cancel: CancellationToken,
}

struct CycleState {
    seen: SeenSet,
    errors: ErrorWindow,
    reasoner_failures: u32,
    cycle: u64,
    last_mode: Option<ProcessingMode>,
    last_complexity: f64,
    /// Recent action outcomes, newest last.
    outcomes: VecDeque<Value>,
    outcomes_since_reflection: usize,
    /// Summary of the current cycle's stimuli, for error logs.
    stimulus: Value,
}

impl AgentWorker {
    pub(crate) async fn run(mut self) {
        let agent_id = self.record.id.clone();
        info!(agent_id = %agent_id, kind = %self.record.kind, "agent started");

        let mut cs = CycleState {
            seen: SeenSet::new(self.config.dedup_capacity),
            errors: ErrorWindow::new(self.config.error_window(), self.config.max_errors_in_window),
            reasoner_failures: 0,
            cycle: 0,
            last_mode: None,
            last_complexity: 0.0,
            outcomes: VecDeque::new(),
            outcomes_since_reflection: 0,
            stimulus: Value::Null,
        };

        while !self.cancel.is_cancelled() {
            cs.cycle += 1;
            cs.stimulus = Value::Null;
            match self.cycle(&mut cs).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    AgentMetrics::inc(&self.metrics.cycle_errors);
                    error!(
                        agent_id = %agent_id,
                        cycle = cs.cycle,
                        stimulus = %cs.stimulus,
                        error = %e,
                        "cycle failed"
                    );
                    if cs.errors.record() {
                        let reason = format!(
                            "more than {} errors within {}s (last: {e})",
                            self.config.max_errors_in_window, self.config.error_window_secs
                        );
                        self.fail(reason).await;
                        return;
                    }
                }
            }

            if cs.reasoner_failures > self.config.reasoner_retry_budget {
                let reason = format!(
                    "{} consecutive reasoner failures exceed the retry budget of {}",
                    cs.reasoner_failures, self.config.reasoner_retry_budget
                );
                self.fail(reason).await;
                return;
            }
        }

        info!(agent_id = %agent_id, cycles = cs.cycle, "agent worker exiting");
    }

    async fn fail(&self, reason: String) {
        error!(agent_id = %self.record.id, reason = %reason, "agent entering error state");
        self.runtime
            .mark_failed(&self.record.id, self.generation, reason)
            .await;
    }

    async fn cycle(&mut self, cs: &mut CycleState) -> Result<Flow> {
        // ── 1. Perceive ───
        let Some(perception) = self.perceive(cs).await else {
            return Ok(Flow::Stop);
        };
        if !perception.is_empty() {
            cs.stimulus = Value::Array(perception.records());
        }

        // ── 2. Update beliefs ───
        self.state.absorb(&perception.messages);

        // ── 3. Deliberate ───
        let input = DeliberationInput {
            record: &self.record,
            state: &self.state,
            perception: &perception,
        };
        let deliberation = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Flow::Stop),
            d = self.strategy.deliberate(input) => d,
        };
        let deliberation = match deliberation {
            Ok(d) => d,
            Err(e) => {
                if is_reasoner_error(&e) {
                    self.note_reasoner_failure(cs, &e);
                }
                return Err(e);
            }
        };

        self.metrics.record_mode(deliberation.mode);
        AgentMetrics::add(&self.metrics.rule_matches, deliberation.rule_matches as u64);
        cs.last_mode = Some(deliberation.mode);
        cs.last_complexity = deliberation.complexity;

        for failure in &deliberation.template_failures {
            AgentMetrics::inc(&self.metrics.template_failures);
            warn!(agent_id = %self.record.id, error = %failure, "rule skipped");
        }
        if deliberation.reasoner_called {
            AgentMetrics::inc(&self.metrics.reasoner_calls);
            match &deliberation.reasoner_error {
                Some(e) => {
                    warn!(agent_id = %self.record.id, error = %e, "reasoner failed, keeping rule actions");
                    self.note_reasoner_failure(cs, e);
                }
                None => cs.reasoner_failures = 0,
            }
        }

        // ── 4. Act ───
        for output in deliberation.output {
            for action in normalize_actions(output) {
                let outcome = {
                    let mut ctx = ActionContext {
                        agent_id: &self.record.id,
                        state: &mut self.state,
                        perception: &perception,
                        runtime: &self.runtime,
                    };
                    dispatch(&action, &mut ctx).await
                };
                self.record_outcome(cs, &action.action_type, outcome);
            }
        }

        // ── 5. Reflect ───
        if let Flow::Stop = self.maybe_reflect(cs).await {
            return Ok(Flow::Stop);
        }

        // ── 6. Commit ───
        self.state.recompute_intentions(self.config.max_intentions);
        AgentMetrics::inc(&self.metrics.cycles);
        self.publish_snapshot(cs);
        Ok(Flow::Continue)
    }

    /// Wait up to one tick for mail, drain a batch, and claim due tasks.
    /// Returns `None` when the agent should stop, including when a store
    /// failure trips the error window.
    async fn perceive(&mut self, cs: &mut CycleState) -> Option<Perception> {
        let tick = self.config.tick_interval();
        let first = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = tokio::time::timeout(tick, self.rx.recv()) => match r {
                Ok(Some(m)) => Some(m),
                Ok(None) => return None,
                Err(_) => None,
            },
        };

        let mut perception = Perception::default();
        let batch = self.config.perceive_batch.max(1);
        let mut next = first;
        let mut taken = 0;
        while let Some(message) = next {
            taken += 1;
            if cs.seen.insert(message.id) {
                AgentMetrics::inc(&self.metrics.messages_processed);
                self.runtime.events().publish(Event::MessageConsumed {
                    agent_id: self.record.id.clone(),
                    message_id: message.id,
                });
                perception.messages.push(message);
            } else {
                AgentMetrics::inc(&self.metrics.duplicates_skipped);
                debug!(agent_id = %self.record.id, message_id = %message.id, "skipping duplicate message");
            }
            next = if taken < batch {
                self.rx.try_recv().ok()
            } else {
                None
            };
        }

        if self.config.task_batch > 0 {
            let store = self.runtime.store();
            let agent_id = self.record.id.clone();
            let limit = self.config.task_batch;
            match retry_with_backoff("load_due_tasks", self.runtime.retry_policy(), || {
                store.load_due_tasks(&agent_id, limit)
            })
            .await
            {
                Ok(tasks) => {
                    AgentMetrics::add(&self.metrics.tasks_claimed, tasks.len() as u64);
                    perception.tasks = tasks;
                }
                Err(e) => {
                    warn!(agent_id = %self.record.id, error = %e, "could not load due tasks");
                    AgentMetrics::inc(&self.metrics.cycle_errors);
                    if cs.errors.record() {
                        let reason = format!(
                            "more than {} errors within {}s (last: {e})",
                            self.config.max_errors_in_window, self.config.error_window_secs
                        );
                        self.fail(reason).await;
                        return None;
                    }
                }
            }
        }

        Some(perception)
    }

    fn note_reasoner_failure(&self, cs: &mut CycleState, e: &ColonyError) {
        AgentMetrics::inc(&self.metrics.reasoner_failures);
        if !matches!(e, ColonyError::ReasonerUnavailable(_)) {
            cs.reasoner_failures += 1;
        }
    }

    fn record_outcome(&self, cs: &mut CycleState, action_type: &str, outcome: Result<Value>) {
        let entry = match outcome {
            Ok(detail) => {
                AgentMetrics::inc(&self.metrics.actions_executed);
                self.runtime.events().publish(Event::ActionExecuted {
                    agent_id: self.record.id.clone(),
                    action_type: action_type.to_string(),
                    detail: detail.clone(),
                });
                json!({"action": action_type, "ok": true, "detail": detail})
            }
            Err(e) => {
                AgentMetrics::inc(&self.metrics.action_failures);
                warn!(agent_id = %self.record.id, action_type, error = %e, "action failed");
                self.runtime.events().publish(Event::ActionFailed {
                    agent_id: self.record.id.clone(),
                    action_type: action_type.to_string(),
                    error: e.to_string(),
                });
                json!({"action": action_type, "ok": false, "error": e.to_string()})
            }
        };
        cs.outcomes.push_back(entry);
        while cs.outcomes.len() > self.config.outcome_history.max(1) {
            cs.outcomes.pop_front();
        }
        cs.outcomes_since_reflection += 1;
    }

    async fn maybe_reflect(&mut self, cs: &mut CycleState) -> Flow {
        let every = self.config.reflect_every;
        if !self.record.kind.uses_reasoner()
            || every == 0
            || cs.cycle % every != 0
            || cs.outcomes_since_reflection == 0
        {
            return Flow::Continue;
        }
        let Some(reasoner) = self.reasoner.clone() else {
            return Flow::Continue;
        };

        let ctx = ReasonerContext {
            agent_id: self.record.id.clone(),
            role: self.record.role.clone(),
            beliefs: self.state.beliefs.clone(),
            desires: self.state.desires.clone(),
            intentions: self.state.intentions.clone(),
            perception: Vec::new(),
            outcomes: cs.outcomes.iter().cloned().collect(),
        };
        let limit = self.timeouts.for_tier(ReasoningTier::Deep);

        AgentMetrics::inc(&self.metrics.reasoner_calls);
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Flow::Stop,
            r = tokio::time::timeout(limit, reasoner.reflect(&ctx)) => r,
        };
        cs.outcomes_since_reflection = 0;

        match result {
            Ok(Ok(payload)) => {
                cs.reasoner_failures = 0;
                self.apply_reflection(payload.into_inner());
            }
            Ok(Err(e)) => {
                warn!(agent_id = %self.record.id, error = %e, "reflection failed");
                self.note_reasoner_failure(cs, &e);
            }
            Err(_) => {
                let e = ColonyError::ReasonerTimeout {
                    tier: "reflect".into(),
                    secs: limit.as_secs(),
                };
                warn!(agent_id = %self.record.id, error = %e, "reflection failed");
                self.note_reasoner_failure(cs, &e);
            }
        }
        Flow::Continue
    }

    /// Apply a reflection: replace desires and adjust the confidence bias.
    fn apply_reflection(&mut self, payload: Value) {
        let reflection = coerce_record(payload);

        if let Some(desires) = reflection.get("desires").filter(|v| !v.is_null()) {
            let desires = coerce_string_list(desires);
            debug!(agent_id = %self.record.id, ?desires, "reflection replaced desires");
            self.state.desires = desires;
        }

        if let Some(raw) = reflection.get("confidence_adjustment") {
            match coerce_f64(raw) {
                Some(delta) => {
                    self.state.confidence_bias =
                        (self.state.confidence_bias + delta).clamp(-1.0, 1.0);
                }
                None => warn!(
                    agent_id = %self.record.id,
                    value = %raw,
                    "discarding non-numeric confidence adjustment"
                ),
            }
        } else if let Some(raw) = reflection
            .get("confidence_bias")
            .or_else(|| reflection.get("confidence"))
        {
            match coerce_f64(raw) {
                Some(b) => self.state.confidence_bias = b.clamp(-1.0, 1.0),
                None => warn!(
                    agent_id = %self.record.id,
                    value = %raw,
                    "discarding non-numeric confidence bias"
                ),
            }
        }

        if let Some(summary) = reflection.get("summary").and_then(|s| s.as_str()) {
            info!(agent_id = %self.record.id, summary, "reflection");
        }
    }

    fn publish_snapshot(&self, cs: &CycleState) {
        let snapshot = BdiSnapshot {
            agent_id: self.record.id.clone(),
            kind: self.record.kind,
            beliefs: self.state.beliefs.clone(),
            desires: self.state.desires.clone(),
            intentions: self.state.intentions.clone(),
            confidence_bias: self.state.confidence_bias,
            last_mode: cs.last_mode,
            last_complexity: cs.last_complexity,
            cycle: cs.cycle,
            updated_at: Utc::now(),
        };
        *self.snapshot.write() = snapshot;
    }
}

fn is_reasoner_error(e: &ColonyError) -> bool {
    matches!(
        e,
        ColonyError::Reasoner(_)
            | ColonyError::ReasonerTimeout { .. }
            | ColonyError::ReasonerUnavailable(_)
            | ColonyError::LlmProvider(_)
            | ColonyError::RateLimited { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_set_evicts_oldest() {
        let mut seen = SeenSet::new(2);
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let c = uuid::Uuid::new_v4();
        assert!(seen.insert(a));
        assert!(!seen.insert(a));
        assert!(seen.insert(b));
        assert!(seen.insert(c));
        // `a` fell out of the window
        assert!(seen.insert(a));
    }

    #[test]
    fn test_error_window_trips_past_limit() {
        let mut window = ErrorWindow::new(Duration::from_secs(60), 2);
        assert!(!window.record());
        assert!(!window.record());
        assert!(window.record());
    }

    #[test]
    fn test_absorb_only_inform_messages() {
        let mut state = AgentState::default();
        let inform = Message::new("a", "b", Performative::Inform, json!({"temp": 21}));
        let request = Message::new("a", "b", Performative::Request, json!({"temp": 99}));
        let scalar = Message::new("a", "b", Performative::Inform, json!("sunny"));
        state.absorb(&[inform, request, scalar]);
        assert_eq!(state.beliefs["temp"], 21);
        assert_eq!(state.beliefs["value"], "sunny");
    }

    #[test]
    fn test_recompute_intentions() {
        let mut state = AgentState {
            desires: vec!["a".into(), "b".into(), "c".into()],
            ..Default::default()
        };
        state.recompute_intentions(2);
        assert_eq!(state.intentions, vec!["a".to_string(), "b".to_string()]);
    }
}
