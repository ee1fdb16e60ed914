//! # colony-llm
//!
//! Abstraction layer over LLM providers and the reasoner used by cognitive
//! and hybrid agents. Ships an OpenAI-compatible HTTP provider and a
//! deterministic mock for tests.

pub mod mock;
pub mod openai;
pub mod provider;
pub mod reasoner;

pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiProvider;
pub use provider::{ChatMessage, ChatRole, LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
pub use reasoner::{DecisionPayload, LlmReasoner, Reasoner, ReasonerContext, ReasoningTier};
