//! Per-agent counters. Updated by the agent's own cycle, read by anyone.

use colony_core::{AgentId, AgentStatus, ProcessingMode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub cycles: AtomicU64,
    pub messages_processed: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub tasks_claimed: AtomicU64,
    pub actions_executed: AtomicU64,
    pub action_failures: AtomicU64,
    pub cycle_errors: AtomicU64,
    pub reasoner_calls: AtomicU64,
    pub reasoner_failures: AtomicU64,
    pub rule_matches: AtomicU64,
    pub template_failures: AtomicU64,
    pub reflexive_cycles: AtomicU64,
    pub cognitive_cycles: AtomicU64,
    pub mixed_cycles: AtomicU64,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_mode(&self, mode: ProcessingMode) {
        let counter = match mode {
            ProcessingMode::Reflexive => &self.reflexive_cycles,
            ProcessingMode::Cognitive => &self.cognitive_cycles,
            ProcessingMode::Mixed => &self.mixed_cycles,
        };
        Self::inc(counter);
    }

    pub fn snapshot(
        &self,
        agent_id: &str,
        status: AgentStatus,
        mailbox_depth: usize,
        pending_delivery: usize,
    ) -> AgentMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AgentMetricsSnapshot {
            agent_id: agent_id.to_string(),
            status,
            mailbox_depth,
            pending_delivery,
            cycles: load(&self.cycles),
            messages_processed: load(&self.messages_processed),
            duplicates_skipped: load(&self.duplicates_skipped),
            tasks_claimed: load(&self.tasks_claimed),
            actions_executed: load(&self.actions_executed),
            action_failures: load(&self.action_failures),
            cycle_errors: load(&self.cycle_errors),
            reasoner_calls: load(&self.reasoner_calls),
            reasoner_failures: load(&self.reasoner_failures),
            rule_matches: load(&self.rule_matches),
            template_failures: load(&self.template_failures),
            reflexive_cycles: load(&self.reflexive_cycles),
            cognitive_cycles: load(&self.cognitive_cycles),
            mixed_cycles: load(&self.mixed_cycles),
        }
    }
}

/// Point-in-time copy of an agent's counters.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMetricsSnapshot {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub mailbox_depth: usize,
    /// Messages stored for this agent that the bridge has yet to place.
    pub pending_delivery: usize,
    pub cycles: u64,
    pub messages_processed: u64,
    pub duplicates_skipped: u64,
    pub tasks_claimed: u64,
    pub actions_executed: u64,
    pub action_failures: u64,
    pub cycle_errors: u64,
    pub reasoner_calls: u64,
    pub reasoner_failures: u64,
    pub rule_matches: u64,
    pub template_failures: u64,
    pub reflexive_cycles: u64,
    pub cognitive_cycles: u64,
    pub mixed_cycles: u64,
}
