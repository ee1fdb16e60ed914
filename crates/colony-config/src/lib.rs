//! # colony-config
//!
//! Configuration system for the Colony runtime. Reads from `colony.toml` and
//! environment variables, in that precedence order, then validates the result.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ColonyConfig;
pub use schema::{
    BridgeConfig, ComplexityWeights, ConfigWarning, LoggingConfig, MixedPolicy, ReasonerConfig,
    RuntimeConfig, StoreConfig, WarningSeverity,
};
