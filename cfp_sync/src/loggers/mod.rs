//! # Logging
//!
//! Subscriber installation for binaries and smoke tests. Library code only
//! emits `tracing` events.

/// Console and rolling JSON file layers.
pub mod tracing_setup;

pub use tracing_setup::init_tracing;
