//! # colony-store
//!
//! Durable storage for the colony runtime: inter-agent messages awaiting
//! delivery, tasks and their results, and agent records.
//!
//! - [`SqliteStore`]: single-file SQLite database (WAL), the default backend.
//! - [`MemoryStore`]: in-process maps, for tests and throwaway runs.
//!
//! Callers wrap store calls in [`retry_with_backoff`].

pub mod memory;
pub mod retry;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use sqlite::SqliteStore;
pub use store::Store;
