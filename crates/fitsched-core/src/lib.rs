//! fitsched core: shared types for the scheduler workspace.
//!
//! - **`types`**: control-plane API objects (nodes, pods, bindings, events)
//! - **`config`**: `fitsched.toml` parsing and defaults

pub mod config;
pub mod types;

pub use config::{ConfigError, SchedulerConfig, ScoringMode, parse_duration};
pub use types::*;
