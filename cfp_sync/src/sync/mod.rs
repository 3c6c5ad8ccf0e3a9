//! # Synchronization
//!
//! The components that decide what data a screen sees and when it changes.
//!
//! - **`cascading_loader`**: cache first, then an unconditional remote refresh.
//! - **`fan_in`**: per-day session fetches joined at one bounded wait.
//! - **`reconciler`**: presence merge of user lists and their write-through.
//! - **`reload_signal`**: pushed invalidations that force a fresh cycle.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Cache-first, remote-second loading of conference resources.
pub mod cascading_loader;
/// Shared state of the loader tasks.
pub mod context;
/// Concurrent per-day session fetching.
pub mod fan_in;
/// User list merge and write-through binding.
pub mod reconciler;
/// Reload marker handling.
pub mod reload_signal;

// --- Public API Re-exports ---
pub use cascading_loader::{CascadingLoader, LoadMode, RemoteResource};
pub use context::{ActiveConference, SyncContext};
pub use fan_in::{aggregate_sessions, FanInOutcome};
pub use reconciler::{plan_merge, ChangeOrigin, ListChange, MergePlan, ReconcileOutcome, Reconciler, UserList};
pub use reload_signal::{extract_conference_id, ReloadSignal};
