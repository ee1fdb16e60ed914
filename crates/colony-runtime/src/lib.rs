//! # colony-runtime
//!
//! The multi-agent runtime: a supervisor that owns one BDI worker per live
//! agent, bounded mailboxes, and a delivery bridge draining the durable store.
//!
//! ## Architecture
//!
//! ```text
//!     Runtime::send ──▶ Store ──▶ DeliveryBridge ──┐
//!           │                                     │
//!           └──────── direct placement ───────────┤
//!                                                 ▼
//!                                       ┌──────────────────┐
//!                                       │     Mailbox      │  bounded mpsc
//!                                       └────────┬─────────┘
//!                                                ▼
//!                                       ┌──────────────────┐
//!                                       │   Agent worker   │
//!                                       │                  │
//!                                       │  1. Perceive     │  ← mailbox + due tasks
//!                                       │  2. Beliefs      │
//!                                       │  3. Deliberate   │  ← rules / reasoner
//!                                       │  4. Act          │
//!                                       │  5. Reflect      │
//!                                       └──────────────────┘
//! ```

pub mod action;
pub mod agent;
pub mod arbitrator;
pub mod bridge;
pub mod deliberation;
pub mod mailbox;
pub mod metrics;
pub mod perception;
pub mod rules;
pub mod supervisor;

pub use action::{Action, normalize_actions};
pub use agent::{AgentState, BdiSnapshot};
pub use arbitrator::{assess_complexity, choose_mode, needs_deep_reasoning};
pub use bridge::{DeliveryBridge, TickReport};
pub use deliberation::{Deliberate, Deliberation, DeliberationInput, ReasonerTimeouts, strategy_for};
pub use mailbox::{Mailbox, mailbox};
pub use metrics::{AgentMetrics, AgentMetricsSnapshot};
pub use perception::{Perception, Stimulus};
pub use rules::{RuleMatches, match_rules};
pub use supervisor::{AgentInfo, Runtime, RuntimeBuilder};
