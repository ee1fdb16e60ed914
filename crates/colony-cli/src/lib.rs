//! # colony-cli
//!
//! Command-line interface for the Colony agent runtime.
//!
//! ## Commands
//!
//! - `colony run`: Start the configured agents and the delivery bridge
//! - `colony config`: Show the effective configuration
//! - `colony agents`: List configured agents and their last known status
//! - `colony doctor`: Validate the configuration
//! - `colony completions`: Generate shell completions

pub mod commands;

pub use commands::Cli;
