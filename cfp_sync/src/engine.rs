//! # Sync Engine
//!
//! The injected engine instance presentation code talks to. It owns the UI
//! context, the conference-scoped collections and the user session, and it
//! wires the loaders, the reconciler and the reload signal together.
//!
//! Fetch-path failures never surface here: they are logged and the visible
//! data simply stays as it was. The only errors callers see are precondition
//! failures (nobody signed in, no conference selected), returned synchronously
//! before any work starts, plus the results of request/response calls such as
//! [`SyncEngine::verify_account`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::configs::EngineConfig;
use crate::core::{ObservableList, ObservableValue, RetrievalState, UiContext};
use crate::error::{SyncError, SyncResult};
use crate::model::{
    Conference, ListKind, ListPayload, ProposalType, ResourceType, Session, Speaker, Track, UserListItem,
};
use crate::retrieve::cloud_functions::{VERIFY_ACCOUNT, VOTE_TALK};
use crate::retrieve::{build_client, CfpApi, CloudFunctions, HttpCfpApi, HttpCloudFunctions, HttpOptions};
use crate::services::{
    verified_account_key, AuthProvider, AuthenticatedUser, InMemorySettings, JsonFileSettings, SettingsStore,
};
use crate::storage::{
    InMemoryListStore, JsonFileListStore, ListStore, LocalCacheStore, NoStorage, StorageProvider,
};
use crate::sync::context::is_active;
use crate::sync::{CascadingLoader, LoadMode, ReloadSignal, Reconciler, SyncContext, UserList};

/// Behavior switches of one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub fan_in_timeout: Duration,
    /// Notes are reconciled with the cloud mirror only when set.
    pub notes_cloud_sync: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fan_in_timeout: Duration::from_secs(120),
            notes_cloud_sync: true,
        }
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fan_in_timeout: config.fan_in_timeout(),
            notes_cloud_sync: config.notes_cloud_sync(),
        }
    }
}

/// External collaborators of the engine.
pub struct EngineDeps {
    pub storage: Arc<dyn StorageProvider>,
    pub api: Arc<dyn CfpApi>,
    pub functions: Arc<dyn CloudFunctions>,
    pub auth: Arc<dyn AuthProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub local_lists: Arc<dyn ListStore>,
    pub cloud_lists: Arc<dyn ListStore>,
}

impl EngineDeps {
    /// Production wiring: HTTP API and cloud functions, file-backed storage,
    /// local lists and settings under the storage root. Without a usable
    /// storage root caching is skipped and user data is kept in memory.
    pub fn from_config(
        config: &EngineConfig,
        auth: Arc<dyn AuthProvider>,
        cloud_lists: Arc<dyn ListStore>,
    ) -> SyncResult<Self> {
        let options = HttpOptions {
            connect_timeout: config.connect_timeout(),
            max_retries: config.http_max_retries(),
            ..HttpOptions::default()
        };
        let transport = build_client(&options)?;
        let functions_url = config
            .cloud_functions_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("no cloud functions URL configured".into()))?;

        let storage = config.storage_provider();
        let (storage, settings, local_lists): (Arc<dyn StorageProvider>, Arc<dyn SettingsStore>, Arc<dyn ListStore>) =
            match storage.private_root() {
                Some(root) => (
                    storage,
                    Arc::new(JsonFileSettings::new(root.join("settings.json"))),
                    Arc::new(JsonFileListStore::new(&root)),
                ),
                None => {
                    warn!("no private storage, loads are remote-only and user data stays in memory");
                    (
                        Arc::new(NoStorage),
                        Arc::new(InMemorySettings::new()),
                        Arc::new(InMemoryListStore::new()),
                    )
                }
            };

        Ok(Self {
            storage,
            api: Arc::new(HttpCfpApi::new(transport.clone())),
            functions: Arc::new(HttpCloudFunctions::new(transport, functions_url)?),
            auth,
            settings,
            local_lists,
            cloud_lists,
        })
    }
}

/// The four user lists of one signed-in user.
struct UserLists {
    favorites: UserList,
    scheduled: UserList,
    notes: UserList,
    votes: UserList,
}

impl UserLists {
    fn new(owner: &str, ui: &UiContext) -> Self {
        Self {
            favorites: UserList::new(ListKind::Favorites, owner, ui.clone()),
            scheduled: UserList::new(ListKind::Scheduled, owner, ui.clone()),
            notes: UserList::new(ListKind::Notes, owner, ui.clone()),
            votes: UserList::new(ListKind::Votes, owner, ui.clone()),
        }
    }

    fn get(&self, kind: ListKind) -> &UserList {
        match kind {
            ListKind::Favorites => &self.favorites,
            ListKind::Scheduled => &self.scheduled,
            ListKind::Notes => &self.notes,
            ListKind::Votes => &self.votes,
        }
    }
}

struct UserSession {
    user: AuthenticatedUser,
    lists: UserLists,
    cancel: CancellationToken,
}

struct EngineInner {
    ctx: Arc<SyncContext>,
    options: EngineOptions,
    sessions: ObservableList<Session>,
    speakers: ObservableList<Speaker>,
    tracks: ObservableList<Track>,
    proposal_types: ObservableList<ProposalType>,
    auth: Arc<dyn AuthProvider>,
    settings: Arc<dyn SettingsStore>,
    functions: Arc<dyn CloudFunctions>,
    reconciler: Reconciler,
    reload: ReloadSignal,
    user_session: Mutex<Option<UserSession>>,
    tasks: TaskTracker,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts an engine on the current tokio runtime.
    pub fn start(options: EngineOptions, deps: EngineDeps) -> Self {
        let (ui, _executor) = UiContext::spawn();
        let cache = LocalCacheStore::new(deps.storage);
        let ctx = Arc::new(SyncContext::new(ui.clone(), cache.clone(), deps.api, options.fan_in_timeout));
        let reconciler = Reconciler::new(
            ui,
            deps.local_lists,
            deps.cloud_lists,
            Arc::clone(&deps.functions),
            ctx.active.clone(),
        );
        Self {
            inner: Arc::new(EngineInner {
                ctx,
                options,
                sessions: ObservableList::new(),
                speakers: ObservableList::new(),
                tracks: ObservableList::new(),
                proposal_types: ObservableList::new(),
                auth: deps.auth,
                settings: deps.settings,
                functions: deps.functions,
                reconciler,
                reload: ReloadSignal::new(cache),
                user_session: Mutex::new(None),
                tasks: TaskTracker::new(),
            }),
        }
    }

    // --- Conference selection ---

    /// Makes `conference` the active one and loads every resource for it.
    /// Switching to a different conference clears the visible collections
    /// first, and a fetch still running for the previous one is followed by a
    /// fetch for this one.
    pub async fn select_conference(&self, conference: Conference) -> SyncResult<()> {
        let selected = Arc::new(conference);
        let inner = Arc::clone(&self.inner);
        let next = Arc::clone(&selected);
        let switched = self
            .inner
            .ctx
            .ui
            .run(move || {
                let switched = inner
                    .ctx
                    .active
                    .get()
                    .map(|previous| previous.id() != next.id())
                    .unwrap_or(true);
                inner.ctx.active.set(Some(next));
                if switched {
                    inner.sessions.replace_all(Vec::new());
                    inner.speakers.replace_all(Vec::new());
                    inner.tracks.replace_all(Vec::new());
                    inner.proposal_types.replace_all(Vec::new());
                }
                switched
            })
            .await?;
        info!(conference = selected.id(), switched, "conference selected");
        let mode = if switched { LoadMode::Switch } else { LoadMode::Cascade };
        for resource in ResourceType::ALL {
            self.spawn_loader(resource, Arc::clone(&selected), mode);
        }
        Ok(())
    }

    pub fn active_conference(&self) -> Option<Arc<Conference>> {
        self.inner.ctx.active_conference()
    }

    pub fn watch_conference(&self) -> watch::Receiver<Option<Arc<Conference>>> {
        self.inner.ctx.active.subscribe()
    }

    // --- Conference-scoped collections ---

    pub fn sessions(&self) -> ObservableList<Session> {
        self.inner.sessions.clone()
    }

    pub fn speakers(&self) -> ObservableList<Speaker> {
        self.inner.speakers.clone()
    }

    pub fn tracks(&self) -> ObservableList<Track> {
        self.inner.tracks.clone()
    }

    pub fn proposal_types(&self) -> ObservableList<ProposalType> {
        self.inner.proposal_types.clone()
    }

    pub fn retrieval_state(&self, resource: ResourceType) -> watch::Receiver<RetrievalState> {
        self.inner.ctx.retrieval_state(resource)
    }

    /// Publishes the cached `resource` and refreshes it from the API.
    pub fn load(&self, resource: ResourceType) -> SyncResult<()> {
        let conference = self.require_conference()?;
        self.spawn_loader(resource, conference, LoadMode::Cascade);
        Ok(())
    }

    /// Refetches `resource` without publishing the cache first. A fetch
    /// already in flight runs this refresh again once it finishes.
    pub fn refresh(&self, resource: ResourceType) -> SyncResult<()> {
        let conference = self.require_conference()?;
        self.spawn_loader(resource, conference, LoadMode::Refresh);
        Ok(())
    }

    pub fn load_all(&self) -> SyncResult<()> {
        let conference = self.require_conference()?;
        for resource in ResourceType::ALL {
            self.spawn_loader(resource, Arc::clone(&conference), LoadMode::Cascade);
        }
        Ok(())
    }

    fn spawn_loader(&self, resource: ResourceType, conference: Arc<Conference>, mode: LoadMode) {
        let ctx = Arc::clone(&self.inner.ctx);
        let tasks = &self.inner.tasks;
        match resource {
            ResourceType::Sessions => {
                tasks.spawn(CascadingLoader::new(ctx, self.sessions()).run(conference, mode));
            }
            ResourceType::Speakers => {
                tasks.spawn(CascadingLoader::new(ctx, self.speakers()).run(conference, mode));
            }
            ResourceType::Tracks => {
                tasks.spawn(CascadingLoader::new(ctx, self.tracks()).run(conference, mode));
            }
            ResourceType::ProposalTypes => {
                tasks.spawn(CascadingLoader::new(ctx, self.proposal_types()).run(conference, mode));
            }
        }
    }

    /// Waits until every load started so far has finished and been committed.
    pub async fn settle(&self) -> SyncResult<()> {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
        self.inner.ctx.ui.flush().await
    }

    pub fn find_session(&self, id: &str) -> Option<Session> {
        self.inner.sessions.snapshot().iter().find(|session| session.id == id).cloned()
    }

    pub fn find_session_by_talk(&self, talk_id: &str) -> Option<Session> {
        self.inner
            .sessions
            .snapshot()
            .iter()
            .find(|session| session.talk_id() == Some(talk_id))
            .cloned()
    }

    /// Visible sessions starting on day `day_index` (1-based) of the active conference.
    pub fn sessions_of_day(&self, day_index: usize) -> Vec<Session> {
        let Some(conference) = self.active_conference() else {
            return Vec::new();
        };
        self.inner
            .sessions
            .snapshot()
            .iter()
            .filter(|session| conference.day_index(session.start) == Some(day_index))
            .cloned()
            .collect()
    }

    /// A single speaker: the summary now, the hydrated record once fetched.
    /// The hydrated record also replaces the summary in [`speakers`](Self::speakers).
    pub fn speaker(&self, uuid: &str) -> SyncResult<ObservableValue<Option<Speaker>>> {
        let conference = self.require_conference()?;
        let summary = self
            .inner
            .speakers
            .snapshot()
            .iter()
            .find(|speaker| speaker.uuid == uuid)
            .cloned();
        let hydrated = summary.as_ref().map(|speaker| speaker.details_retrieved).unwrap_or(false);
        let value = ObservableValue::new(summary);
        if hydrated {
            return Ok(value);
        }

        let inner = Arc::clone(&self.inner);
        let target = value.clone();
        let uuid = uuid.to_string();
        self.inner.tasks.spawn(async move {
            let detailed = match inner.ctx.api.speaker(&conference, &uuid).await {
                Ok(speaker) => speaker.into_detailed(),
                Err(e) => {
                    warn!(speaker = %uuid, error = %e, "speaker details fetch failed");
                    return;
                }
            };
            let committing = Arc::clone(&inner);
            let conference_id = conference.id().to_string();
            let job = move || {
                target.set(Some(detailed.clone()));
                if !is_active(&committing.ctx.active, &conference_id) {
                    return None;
                }
                let replaced = committing.speakers.edit(|speakers| {
                    match speakers.iter_mut().find(|speaker| speaker.uuid == detailed.uuid) {
                        Some(existing) => {
                            *existing = detailed;
                            true
                        }
                        None => false,
                    }
                });
                replaced.then(|| committing.speakers.snapshot())
            };
            match inner.ctx.ui.run(job).await {
                Ok(Some(snapshot)) => {
                    if let Err(e) = inner
                        .ctx
                        .cache
                        .write(conference.id(), ResourceType::Speakers, snapshot.as_slice())
                        .await
                    {
                        warn!(error = %e, "speaker cache write failed");
                    }
                }
                Ok(None) => debug!(speaker = %uuid, "hydrated speaker not in the visible list"),
                Err(e) => warn!(error = %e, "speaker commit dropped"),
            }
        });
        Ok(value)
    }

    // --- User session ---

    /// The list of `kind` for the signed-in user. The first call of an
    /// authenticated session starts reconciliation of all four lists.
    pub fn user_list(&self, kind: ListKind) -> SyncResult<UserList> {
        let user = self.require_user(kind.collection())?;
        let mut session = self.lock_session();
        if let Some(current) = session.as_ref() {
            if current.user.key == user.key {
                return Ok(current.lists.get(kind).clone());
            }
        }
        if let Some(previous) = session.take() {
            self.end_session(previous);
        }
        let started = self.begin_session(user);
        let list = started.lists.get(kind).clone();
        *session = Some(started);
        Ok(list)
    }

    pub fn favorites(&self) -> SyncResult<UserList> {
        self.user_list(ListKind::Favorites)
    }

    pub fn scheduled(&self) -> SyncResult<UserList> {
        self.user_list(ListKind::Scheduled)
    }

    pub fn notes(&self) -> SyncResult<UserList> {
        self.user_list(ListKind::Notes)
    }

    pub fn votes(&self) -> SyncResult<UserList> {
        self.user_list(ListKind::Votes)
    }

    /// Reacts to a login or logout reported by the auth provider.
    pub fn authentication_changed(&self) {
        match self.inner.auth.current_user() {
            Some(user) => {
                if let Err(e) = self.user_list(ListKind::Favorites) {
                    warn!(user = %user.key, error = %e, "could not start user session");
                }
            }
            None => self.logout(),
        }
    }

    /// Stops every binding of the current user and clears their lists.
    pub fn logout(&self) {
        let Some(session) = self.lock_session().take() else {
            return;
        };
        self.end_session(session);
    }

    fn begin_session(&self, user: AuthenticatedUser) -> UserSession {
        let lists = UserLists::new(&user.key, &self.inner.ctx.ui);
        let cancel = CancellationToken::new();
        for kind in ListKind::ALL {
            let cloud_sync = kind != ListKind::Notes || self.inner.options.notes_cloud_sync;
            let reconciler = self.inner.reconciler.clone();
            let list = lists.get(kind).clone();
            let cancel = cancel.clone();
            self.inner.tasks.spawn(async move {
                match reconciler.run(list, cloud_sync, cancel).await {
                    Ok(outcome) => debug!(list = %kind, ?outcome, "reconciliation finished"),
                    Err(e) => warn!(list = %kind, error = %e, "reconciliation aborted"),
                }
            });
        }
        info!(user = %user.key, "user session started");
        UserSession { user, lists, cancel }
    }

    fn end_session(&self, session: UserSession) {
        session.cancel.cancel();
        let lists = session.lists;
        let cleared = self.inner.ctx.ui.post(move || {
            for kind in ListKind::ALL {
                lists.get(kind).publish_loaded(Vec::new());
            }
        });
        if let Err(e) = cleared {
            warn!(error = %e, "could not clear user lists");
        }
        info!(user = %session.user.key, "user session ended");
    }

    /// Records a vote locally and sends it to the `voteTalk` cloud function.
    /// A previous vote for the same talk is replaced.
    pub async fn cast_vote(&self, talk_id: &str, rating: u8, comment: Option<&str>) -> SyncResult<()> {
        let user = self.require_user("voting")?;
        let conference = self.require_conference()?;
        if !(1..=5).contains(&rating) {
            return Err(SyncError::Precondition(format!("rating {rating} is not between 1 and 5")));
        }
        let votes = self.user_list(ListKind::Votes)?;
        votes.remove_talk(talk_id).await?;
        let vote = UserListItem::new(
            &user.key,
            ListPayload::Vote {
                talk_id: talk_id.to_string(),
                rating,
                comment: comment.map(str::to_string),
            },
        );
        votes.add(vote).await?;

        let functions = Arc::clone(&self.inner.functions);
        let args = vec![json!(talk_id), json!(rating), json!(comment)];
        let talk_id = talk_id.to_string();
        self.inner.tasks.spawn(async move {
            match functions
                .call(VOTE_TALK, conference.cfp_endpoint(), &user.key, args)
                .await
            {
                Ok(_) => info!(talk = %talk_id, rating, "vote sent"),
                Err(e) => warn!(talk = %talk_id, error = %e, "vote not sent"),
            }
        });
        Ok(())
    }

    /// Verifies `account` for the active conference. A previously verified
    /// account short-circuits; a newly verified one is remembered.
    pub async fn verify_account(&self, account: &str) -> SyncResult<bool> {
        let user = self.require_user("account verification")?;
        let conference = self.require_conference()?;
        let key = verified_account_key(conference.id());
        if self.inner.settings.get(&key).await?.as_deref() == Some(account) {
            debug!(conference = conference.id(), "account already verified");
            return Ok(true);
        }

        let reply = self
            .inner
            .functions
            .call(VERIFY_ACCOUNT, conference.cfp_endpoint(), &user.key, vec![json!(account)])
            .await?;
        let verified = is_affirmative(&reply);
        if verified {
            self.inner.settings.set(&key, account).await?;
        }
        info!(conference = conference.id(), verified, "account verification answered");
        Ok(verified)
    }

    // --- Reload signal ---

    /// Stores a pushed reload payload for the next [`check_reload`](Self::check_reload).
    pub async fn receive_reload(&self, payload: &str) -> SyncResult<bool> {
        self.inner.reload.receive(payload).await
    }

    /// Forces a session and speaker refresh when the stored payload names the
    /// active conference. Returns whether it did.
    pub async fn check_reload(&self) -> SyncResult<bool> {
        let Some(conference) = self.active_conference() else {
            return Ok(false);
        };
        if !self.inner.reload.take_if_matches(conference.id()).await? {
            return Ok(false);
        }
        self.spawn_loader(ResourceType::Sessions, Arc::clone(&conference), LoadMode::Refresh);
        self.spawn_loader(ResourceType::Speakers, conference, LoadMode::Refresh);
        Ok(true)
    }

    // --- Preconditions ---

    fn require_conference(&self) -> SyncResult<Arc<Conference>> {
        self.active_conference()
            .ok_or_else(|| SyncError::Precondition("no conference selected".into()))
    }

    fn require_user(&self, operation: &str) -> SyncResult<AuthenticatedUser> {
        self.inner
            .auth
            .current_user()
            .ok_or_else(|| SyncError::not_signed_in(operation))
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<UserSession>> {
        self.inner.user_session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_affirmative(reply: &Value) -> bool {
    reply.as_bool().unwrap_or(false)
        || reply
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{is_affirmative, EngineDeps};
    use crate::configs::EngineConfig;
    use crate::model::ListKind;
    use crate::services::{SettingsStore, StaticAuthProvider};
    use crate::storage::{InMemoryListStore, ListStore, StorageProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn deps_for(storage_dir: std::path::PathBuf) -> EngineDeps {
        let config = EngineConfig {
            storage_dir: Some(storage_dir),
            ..EngineConfig::defaults()
        };
        EngineDeps::from_config(
            &config,
            Arc::new(StaticAuthProvider::signed_out()),
            Arc::new(InMemoryListStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unusable_storage_falls_back_to_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let deps = deps_for(blocker.join("root"));
        assert!(deps.storage.private_root().is_none());
        deps.settings.set("k", "v").await.unwrap();
        assert_eq!(deps.settings.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(deps.local_lists.load("u", ListKind::Notes).await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn configured_storage_backs_settings_with_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps_for(tmp.path().to_path_buf());
        assert_eq!(deps.storage.private_root().as_deref(), Some(tmp.path()));
        deps.settings.set("k", "v").await.unwrap();
        assert!(tmp.path().join("settings.json").is_file());
    }

    #[test]
    fn verification_replies() {
        assert!(is_affirmative(&json!(true)));
        assert!(is_affirmative(&json!({"verified": true})));
        assert!(!is_affirmative(&json!({"verified": false})));
        assert!(!is_affirmative(&json!(null)));
        assert!(!is_affirmative(&json!("yes")));
    }
}
