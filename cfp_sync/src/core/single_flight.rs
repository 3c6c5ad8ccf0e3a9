//! # Single-Flight Gates
//!
//! One compare-and-set gate per resource type. A caller that wins the gate gets
//! a [`FlightPermit`]; everybody else is a silent no-op until the permit is
//! released. Releasing happens exactly once, when the permit is dropped or
//! explicitly released after the fetch and its cache write are both done.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::model::ResourceType;

#[derive(Default)]
struct Gate {
    held: AtomicBool,
    /// A forced refresh arrived while the gate was held.
    pending_force: AtomicBool,
}

pub struct SingleFlight {
    gates: HashMap<ResourceType, Arc<Gate>>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        let gates = ResourceType::ALL
            .iter()
            .map(|resource| (*resource, Arc::new(Gate::default())))
            .collect();
        Self { gates }
    }

    fn gate(&self, resource: ResourceType) -> &Arc<Gate> {
        // Every ResourceType is inserted in `new`.
        &self.gates[&resource]
    }

    /// Flips the gate false -> true. `None` means a fetch is already running.
    pub fn try_acquire(&self, resource: ResourceType) -> Option<FlightPermit> {
        let gate = self.gate(resource);
        match gate
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(%resource, "single-flight gate acquired");
                Some(FlightPermit {
                    gate: Arc::clone(gate),
                    resource,
                })
            }
            Err(_) => {
                debug!(%resource, "single-flight gate busy, skipping fetch");
                None
            }
        }
    }

    /// Like [`try_acquire`](Self::try_acquire), but when the gate is busy the
    /// request is remembered so the current holder replays it after release.
    pub fn acquire_forced(&self, resource: ResourceType) -> Option<FlightPermit> {
        if let Some(permit) = self.try_acquire(resource) {
            return Some(permit);
        }
        let gate = self.gate(resource);
        gate.pending_force.store(true, Ordering::Release);
        // The holder may have released between the two steps.
        let permit = self.try_acquire(resource)?;
        gate.pending_force.store(false, Ordering::Release);
        Some(permit)
    }

    pub fn is_held(&self, resource: ResourceType) -> bool {
        self.gate(resource).held.load(Ordering::Acquire)
    }
}

/// Ownership of one resource type's gate.
pub struct FlightPermit {
    gate: Arc<Gate>,
    resource: ResourceType,
}

impl FlightPermit {
    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    /// Releases the gate and reports whether a forced refresh was requested
    /// while it was held.
    pub fn release(self) -> bool {
        let gate = Arc::clone(&self.gate);
        drop(self);
        gate.pending_force.swap(false, Ordering::AcqRel)
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.gate.held.store(false, Ordering::Release);
        debug!(resource = %self.resource, "single-flight gate released");
    }
}
