//! # Core Engine Primitives
//!
//! The concurrency building blocks every synchronization component is built
//! from.
//!
//! - **`ui_context`**: the single sequential executor allowed to mutate
//!   observable state. Worker tasks marshal their results into it.
//! - **`observable`**: snapshot-replacing collections and values that
//!   presentation code watches.
//! - **`single_flight`**: one compare-and-set gate per resource type, so only
//!   one remote fetch per resource runs at a time.
//! - **`retrieval`**: the `Idle -> Running -> Succeeded | Failed` state machine
//!   driving commit and discard decisions.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Snapshot-replacing observable collections.
pub mod observable;
/// Per-operation retrieval state machine.
pub mod retrieval;
/// Per-resource fetch gates.
pub mod single_flight;
/// The sequential mutation context.
pub mod ui_context;

// --- Public API Re-exports ---
pub use observable::{ObservableList, ObservableValue};
pub use retrieval::{Retrieval, RetrievalState};
pub use single_flight::{FlightPermit, SingleFlight};
pub use ui_context::UiContext;
