//! Shared state handed to every loader task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::{ObservableValue, Retrieval, RetrievalState, SingleFlight, UiContext};
use crate::model::{Conference, ResourceType};
use crate::retrieve::CfpApi;
use crate::storage::LocalCacheStore;

/// The currently selected conference, observable by presentation code.
pub type ActiveConference = ObservableValue<Option<Arc<Conference>>>;

pub struct SyncContext {
    pub(crate) ui: UiContext,
    pub(crate) cache: LocalCacheStore,
    pub(crate) flights: SingleFlight,
    pub(crate) api: Arc<dyn CfpApi>,
    pub(crate) active: ActiveConference,
    pub(crate) fan_in_timeout: Duration,
    states: HashMap<ResourceType, Arc<watch::Sender<RetrievalState>>>,
}

impl SyncContext {
    pub fn new(ui: UiContext, cache: LocalCacheStore, api: Arc<dyn CfpApi>, fan_in_timeout: Duration) -> Self {
        let states = ResourceType::ALL
            .iter()
            .map(|resource| (*resource, Arc::new(watch::channel(RetrievalState::Idle).0)))
            .collect();
        Self {
            ui,
            cache,
            flights: SingleFlight::new(),
            api,
            active: ObservableValue::new(None),
            fan_in_timeout,
            states,
        }
    }

    pub fn active_conference(&self) -> Option<Arc<Conference>> {
        self.active.get()
    }

    /// A fresh retrieval cycle for `resource`, mirrored to its state channel.
    pub(crate) fn retrieval(&self, resource: ResourceType) -> Retrieval {
        match self.states.get(&resource) {
            Some(publish) => Retrieval::published(Arc::clone(publish)),
            None => Retrieval::new(),
        }
    }

    /// State of the latest retrieval cycle of `resource`.
    pub fn retrieval_state(&self, resource: ResourceType) -> watch::Receiver<RetrievalState> {
        match self.states.get(&resource) {
            Some(publish) => publish.subscribe(),
            None => watch::channel(RetrievalState::Idle).1,
        }
    }
}

/// True when `conference_id` is the selected conference. Only meaningful when
/// called on the UI context, where selection changes are applied.
pub(crate) fn is_active(active: &ActiveConference, conference_id: &str) -> bool {
    active
        .get()
        .map(|conference| conference.id() == conference_id)
        .unwrap_or(false)
}
