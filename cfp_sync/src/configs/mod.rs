//! # Configuration
//!
//! Layered engine settings: defaults, JSON file, environment and flags.

/// The engine's settings and their loading.
pub mod engine_config;

pub use engine_config::{load_config, resolve_config, EngineConfig};
