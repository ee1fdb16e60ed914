//! # Mode arbitration
//!
//! Hybrid agents score each perception's complexity and pick a processing
//! mode from it. Both functions are pure.

use colony_config::ComplexityWeights;
use colony_core::{Priority, ProcessingMode};

use crate::perception::Perception;

/// Score a perception in [0, 1]. Missing fields contribute nothing.
pub fn assess_complexity(perception: &Perception, weights: &ComplexityWeights) -> f64 {
    let is_complex = |t: &str| {
        weights
            .complex_task_types
            .iter()
            .any(|c| c.eq_ignore_ascii_case(t))
    };

    let message_load = perception.messages.len() as f64;
    let task_load: f64 = perception.tasks.iter().map(|t| t.priority.weight()).sum();
    let complex_types = perception
        .tasks
        .iter()
        .filter(|t| is_complex(&t.task_type))
        .count()
        + perception
            .messages
            .iter()
            .filter(|m| m.content.get("type").and_then(|v| v.as_str()).is_some_and(is_complex))
            .count();
    let negotiations = perception
        .messages
        .iter()
        .filter(|m| m.performative.is_negotiation())
        .count();

    let score = contribution(message_load, weights.message_cap, weights.message_weight)
        + contribution(task_load, weights.task_cap, weights.task_weight)
        + contribution(
            complex_types as f64,
            weights.complex_type_cap,
            weights.complex_type_weight,
        )
        + contribution(
            negotiations as f64,
            weights.negotiation_cap,
            weights.negotiation_weight,
        );

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn contribution(raw: f64, cap: f64, weight: f64) -> f64 {
    if cap <= 0.0 || raw <= 0.0 {
        return 0.0;
    }
    (raw / cap).min(1.0) * weight.max(0.0)
}

/// Pick a mode for `score` against an agent's threshold.
///
/// - `score >= threshold` → Cognitive
/// - `threshold - band <= score < threshold` → Mixed
/// - otherwise → Reflexive
pub fn choose_mode(score: f64, threshold: f64, band: f64) -> ProcessingMode {
    let band = band.max(0.0);
    if score >= threshold {
        ProcessingMode::Cognitive
    } else if score >= threshold - band {
        ProcessingMode::Mixed
    } else {
        ProcessingMode::Reflexive
    }
}

/// Whether a perception warrants the deep reasoning tier.
pub fn needs_deep_reasoning(perception: &Perception, score: f64, threshold: f64) -> bool {
    score >= threshold
        || perception
            .tasks
            .iter()
            .any(|t| t.priority >= Priority::High)
}
