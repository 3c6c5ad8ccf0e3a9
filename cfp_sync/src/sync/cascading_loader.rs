//! # Cascading Loader
//!
//! "Local cache first, then an unconditional remote refresh." A load publishes
//! the cached snapshot (when one parses) and then, gated by the resource's
//! single-flight permit, fetches the remote copy, replaces the visible
//! collection with it and overwrites the cache file. Every publish replaces
//! the whole collection.
//!
//! Commits run on the UI context and are dropped when the conference they
//! were fetched for is no longer the selected one.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::context::{is_active, SyncContext};
use super::fan_in::aggregate_sessions;
use crate::core::{FlightPermit, ObservableList, Retrieval};
use crate::error::SyncResult;
use crate::model::{Conference, ProposalType, ResourceType, Session, Speaker, Track};

/// A conference-scoped resource with a remote source and a cache file.
pub trait RemoteResource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const RESOURCE: ResourceType;

    fn fetch(ctx: Arc<SyncContext>, conference: Arc<Conference>) -> BoxFuture<'static, SyncResult<Vec<Self>>>;
}

impl RemoteResource for Session {
    const RESOURCE: ResourceType = ResourceType::Sessions;

    fn fetch(ctx: Arc<SyncContext>, conference: Arc<Conference>) -> BoxFuture<'static, SyncResult<Vec<Self>>> {
        aggregate_sessions(Arc::clone(&ctx.api), conference, ctx.fan_in_timeout).boxed()
    }
}

impl RemoteResource for Speaker {
    const RESOURCE: ResourceType = ResourceType::Speakers;

    fn fetch(ctx: Arc<SyncContext>, conference: Arc<Conference>) -> BoxFuture<'static, SyncResult<Vec<Self>>> {
        async move { ctx.api.speakers(&conference).await }.boxed()
    }
}

impl RemoteResource for Track {
    const RESOURCE: ResourceType = ResourceType::Tracks;

    fn fetch(ctx: Arc<SyncContext>, conference: Arc<Conference>) -> BoxFuture<'static, SyncResult<Vec<Self>>> {
        async move { ctx.api.tracks(&conference).await }.boxed()
    }
}

impl RemoteResource for ProposalType {
    const RESOURCE: ResourceType = ResourceType::ProposalTypes;

    fn fetch(ctx: Arc<SyncContext>, conference: Arc<Conference>) -> BoxFuture<'static, SyncResult<Vec<Self>>> {
        async move { ctx.api.proposal_types(&conference).await }.boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Publish the cache, then refresh if no fetch is in flight.
    Cascade,
    /// Skip the cache and refresh; a fetch already in flight replays it on release.
    Refresh,
    /// Publish the cache of a newly selected conference, then refresh. A fetch
    /// still running for the previous conference replays it on release.
    Switch,
}

pub struct CascadingLoader<T> {
    ctx: Arc<SyncContext>,
    target: ObservableList<T>,
}

impl<T: RemoteResource> CascadingLoader<T> {
    pub fn new(ctx: Arc<SyncContext>, target: ObservableList<T>) -> Self {
        Self { ctx, target }
    }

    pub async fn run(self, conference: Arc<Conference>, mode: LoadMode) {
        let resource = T::RESOURCE;
        if mode != LoadMode::Refresh {
            self.populate_from_cache(&conference).await;
        }

        let permit = match mode {
            LoadMode::Cascade => self.ctx.flights.try_acquire(resource),
            LoadMode::Refresh | LoadMode::Switch => self.ctx.flights.acquire_forced(resource),
        };
        let Some(mut permit) = permit else {
            debug!(%resource, conference = conference.id(), "fetch already in flight");
            return;
        };

        let mut conference = conference;
        loop {
            self.refresh(&conference, &permit).await;
            if !permit.release() {
                break;
            }
            let Some(active) = self.ctx.active_conference() else {
                break;
            };
            info!(%resource, conference = active.id(), "replaying refresh requested during fetch");
            match self.ctx.flights.try_acquire(resource) {
                Some(next) => permit = next,
                None => break,
            }
            conference = active;
        }
    }

    async fn populate_from_cache(&self, conference: &Conference) {
        match self.ctx.cache.read::<T>(conference.id(), T::RESOURCE).await {
            Ok(items) => {
                let count = items.len();
                if self.commit(conference.id(), items).await {
                    debug!(resource = %T::RESOURCE, conference = conference.id(), count, "published cached snapshot");
                }
            }
            Err(e) => debug!(resource = %T::RESOURCE, error = %e, "no usable cache"),
        }
    }

    /// One fetch cycle. The permit is held by the caller until this returns,
    /// so it covers both the commit and the cache write.
    async fn refresh(&self, conference: &Arc<Conference>, permit: &FlightPermit) {
        let resource = permit.resource();
        let mut retrieval = self.ctx.retrieval(resource);
        advance(&mut retrieval, Retrieval::start);

        match T::fetch(Arc::clone(&self.ctx), Arc::clone(conference)).await {
            Ok(items) => {
                let count = items.len();
                let committed = self.commit(conference.id(), items.clone()).await;
                match self.ctx.cache.write(conference.id(), resource, &items).await {
                    Ok(_) => {}
                    Err(e) => warn!(%resource, conference = conference.id(), error = %e, "cache write failed"),
                }
                advance(&mut retrieval, Retrieval::succeed);
                info!(%resource, conference = conference.id(), count, committed, "remote refresh finished");
            }
            Err(e) => {
                advance(&mut retrieval, Retrieval::fail);
                warn!(%resource, conference = conference.id(), error = %e, "remote refresh failed, keeping current data");
            }
        }
    }

    /// Replaces the visible collection on the UI context. Returns false when
    /// the conference is no longer selected.
    async fn commit(&self, conference_id: &str, items: Vec<T>) -> bool {
        let active = self.ctx.active.clone();
        let target = self.target.clone();
        let conference_id = conference_id.to_string();
        let job = move || {
            if !is_active(&active, &conference_id) {
                debug!(conference = %conference_id, "discarding result for inactive conference");
                return false;
            }
            target.replace_all(items);
            true
        };
        match self.ctx.ui.run(job).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, "commit dropped");
                false
            }
        }
    }
}

fn advance(retrieval: &mut Retrieval, step: fn(&mut Retrieval) -> SyncResult<()>) {
    if let Err(e) = step(retrieval) {
        warn!(error = %e, "retrieval state out of sequence");
    }
}

#[cfg(test)]
mod tests {
    use super::{CascadingLoader, LoadMode};
    use crate::core::{ObservableList, RetrievalState, UiContext};
    use crate::error::{SyncError, SyncResult};
    use crate::model::{Conference, ProposalType, ResourceType, Session, Speaker, Track};
    use crate::retrieve::{CfpApi, ScheduleLink};
    use crate::storage::{DirectoryStorage, LocalCacheStore};
    use crate::sync::context::SyncContext;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct TrackApi {
        calls: AtomicUsize,
        tracks: Option<Vec<Track>>,
    }

    #[async_trait]
    impl CfpApi for TrackApi {
        async fn schedule_links(&self, _: &Conference) -> SyncResult<Vec<ScheduleLink>> {
            Ok(Vec::new())
        }
        async fn day_sessions(&self, _: &Conference, _: &ScheduleLink) -> SyncResult<Vec<Session>> {
            Ok(Vec::new())
        }
        async fn speakers(&self, _: &Conference) -> SyncResult<Vec<Speaker>> {
            Ok(Vec::new())
        }
        async fn speaker(&self, _: &Conference, uuid: &str) -> SyncResult<Speaker> {
            Err(SyncError::remote(uuid, "unused"))
        }
        async fn tracks(&self, _: &Conference) -> SyncResult<Vec<Track>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tracks.clone().ok_or_else(|| SyncError::remote("tracks", "status 503"))
        }
        async fn proposal_types(&self, _: &Conference) -> SyncResult<Vec<ProposalType>> {
            Ok(Vec::new())
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: id.to_uppercase(),
            description: String::new(),
            image_url: None,
        }
    }

    async fn context(root: &std::path::Path, tracks: Option<Vec<Track>>) -> Arc<SyncContext> {
        let (ui, _executor) = UiContext::spawn();
        let cache = LocalCacheStore::new(Arc::new(DirectoryStorage::new(root)));
        let api = Arc::new(TrackApi {
            calls: AtomicUsize::new(0),
            tracks,
        });
        let ctx = Arc::new(SyncContext::new(ui, cache, api, Duration::from_secs(120)));
        let conference = Conference::new(
            "DVBE18",
            "Europe/Brussels",
            NaiveDate::from_ymd_opt(2018, 11, 12).unwrap(),
            NaiveDate::from_ymd_opt(2018, 11, 16).unwrap(),
            "https://cfp.devoxx.be/api",
        )
        .unwrap();
        ctx.active.set(Some(Arc::new(conference)));
        ctx
    }

    #[tokio::test]
    async fn remote_result_replaces_cache_and_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Some(vec![track("java"), track("web")])).await;
        ctx.cache.write("DVBE18", ResourceType::Tracks, &[track("old")]).await.unwrap();
        let target = ObservableList::<Track>::new();
        let conference = ctx.active_conference().unwrap();

        CascadingLoader::new(Arc::clone(&ctx), target.clone())
            .run(conference, LoadMode::Cascade)
            .await;

        let visible: Vec<String> = target.snapshot().iter().map(|t| t.id.clone()).collect();
        assert_eq!(visible, vec!["java", "web"]);
        assert_eq!(target.revision(), 2, "cache publish then remote publish");
        let cached: Vec<Track> = ctx.cache.read("DVBE18", ResourceType::Tracks).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(*ctx.retrieval_state(ResourceType::Tracks).borrow(), RetrievalState::Succeeded);
        assert!(!ctx.flights.is_held(ResourceType::Tracks));
    }

    #[tokio::test]
    async fn remote_failure_keeps_cached_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), None).await;
        ctx.cache.write("DVBE18", ResourceType::Tracks, &[track("old")]).await.unwrap();
        let target = ObservableList::<Track>::new();

        CascadingLoader::new(Arc::clone(&ctx), target.clone())
            .run(ctx.active_conference().unwrap(), LoadMode::Cascade)
            .await;

        assert_eq!(target.snapshot()[0].id, "old");
        assert_eq!(*ctx.retrieval_state(ResourceType::Tracks).borrow(), RetrievalState::Failed);
        assert!(!ctx.flights.is_held(ResourceType::Tracks));
    }

    #[tokio::test]
    async fn corrupt_cache_falls_through_to_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Some(vec![track("java")])).await;
        let path = ctx.cache.cache_path("DVBE18", ResourceType::Tracks).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{\"id\":").unwrap();
        let target = ObservableList::<Track>::new();

        CascadingLoader::new(Arc::clone(&ctx), target.clone())
            .run(ctx.active_conference().unwrap(), LoadMode::Cascade)
            .await;

        assert_eq!(target.len(), 1);
        assert_eq!(target.revision(), 1);
    }

    #[tokio::test]
    async fn results_for_a_deselected_conference_are_not_published() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Some(vec![track("java")])).await;
        let conference = ctx.active_conference().unwrap();
        ctx.active.set(None);
        let target = ObservableList::<Track>::new();

        CascadingLoader::new(Arc::clone(&ctx), target.clone())
            .run(conference, LoadMode::Cascade)
            .await;

        assert!(target.is_empty());
        assert_eq!(target.revision(), 0);
    }

    #[tokio::test]
    async fn busy_gate_turns_a_load_into_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Some(vec![track("java")])).await;
        let _held = ctx.flights.try_acquire(ResourceType::Tracks).unwrap();
        let target = ObservableList::<Track>::new();

        CascadingLoader::new(Arc::clone(&ctx), target.clone())
            .run(ctx.active_conference().unwrap(), LoadMode::Cascade)
            .await;

        assert!(target.is_empty());
    }
}
