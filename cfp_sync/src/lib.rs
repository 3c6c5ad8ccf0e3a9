//! # cfp_sync
//!
//! Data synchronization engine of a conference attendee app. It decides what
//! each screen sees, whether it comes from the on-device cache or the CFP API,
//! how local and cloud copies of user lists converge, and how concurrent
//! background fetches are folded into one consistent snapshot.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Layered engine configuration.
pub mod configs;
/// UI context, observables, single-flight gates and retrieval states.
pub mod core;
/// The engine facade.
pub mod engine;
/// The engine's error type.
pub mod error;
/// Subscriber setup for binaries.
pub mod loggers;
/// Conferences, sessions, speakers, taxonomies and user lists.
pub mod model;
/// HTTP transport, CFP API and cloud functions.
pub mod retrieve;
/// Auth and settings collaborators.
pub mod services;
/// On-device cache, list stores and storage resolution.
pub mod storage;
/// Loaders, aggregator, reconciler and reload signal.
pub mod sync;

// --- Public API Re-exports ---
pub use configs::EngineConfig;
pub use engine::{EngineDeps, EngineOptions, SyncEngine};
pub use error::{SyncError, SyncResult};
