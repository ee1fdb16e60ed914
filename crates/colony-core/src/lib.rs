//! # colony-core
//!
//! Core types and primitives for the Colony multi-agent runtime.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! agent records, messages, tasks, events, errors, and the payload coercion helpers
//! applied wherever structured data crosses an external boundary.

pub mod error;
pub mod event;
pub mod message;
pub mod payload;
pub mod task;
pub mod types;

pub use error::{ColonyError, Result};
pub use event::{Event, EventBus};
pub use message::{Message, Performative};
pub use task::{Priority, Task, TaskStatus};
pub use types::*;
