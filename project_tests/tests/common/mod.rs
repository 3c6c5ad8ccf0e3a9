//! In-process fakes shared by the engine scenarios.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cfp_sync::model::{Conference, ListKind, ProposalType, Session, Speaker, Track, UserListItem};
use cfp_sync::retrieve::{CfpApi, RecordingCloudFunctions, ScheduleLink};
use cfp_sync::services::{AuthenticatedUser, InMemorySettings, StaticAuthProvider};
use cfp_sync::storage::{DirectoryStorage, InMemoryListStore, ListStore, NoStorage, StorageProvider};
use cfp_sync::{EngineDeps, EngineOptions, SyncEngine, SyncError, SyncResult};
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::Semaphore;

pub const USER: &str = "user-1";

#[derive(Clone, Copy, Debug)]
pub enum Day {
    Ready(usize),
    Never,
    Fail,
}

/// A scripted CFP API. Day `n` of the manifest answers as `days[n]`.
pub struct ScriptedApi {
    pub days: Mutex<Vec<Day>>,
    pub manifest_calls: AtomicUsize,
    pub day_calls: AtomicUsize,
    pub speaker_list_calls: AtomicUsize,
    pub speaker_calls: AtomicUsize,
    /// Held permits block the matching fetches until released.
    pub day_gate: Semaphore,
    pub speakers_gate: Semaphore,
    /// Only fetches for this conference wait on `day_gate`; `None` gates all.
    pub gated_conference: Mutex<Option<String>>,
}

impl ScriptedApi {
    pub fn new(days: Vec<Day>) -> Arc<Self> {
        Arc::new(Self {
            days: Mutex::new(days),
            manifest_calls: AtomicUsize::new(0),
            day_calls: AtomicUsize::new(0),
            speaker_list_calls: AtomicUsize::new(0),
            speaker_calls: AtomicUsize::new(0),
            day_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            speakers_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            gated_conference: Mutex::new(None),
        })
    }

    /// Makes day fetches (of `conference`, or all) wait until [`open_days`](Self::open_days).
    pub fn close_days(&self, conference: Option<&str>) {
        *self.gated_conference.lock().unwrap() = conference.map(str::to_string);
        self.day_gate.forget_permits(Semaphore::MAX_PERMITS);
    }

    pub fn open_days(&self) {
        self.day_gate.add_permits(1_000);
    }

    pub fn close_speakers(&self) {
        self.speakers_gate.forget_permits(Semaphore::MAX_PERMITS);
    }

    pub fn open_speakers(&self) {
        self.speakers_gate.add_permits(1_000);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub fn session(conference: &str, day: usize, n: usize) -> Session {
    let start = Utc.with_ymd_and_hms(2018, 11, 11 + day as u32, 9 + n as u32, 0, 0).unwrap();
    Session {
        id: format!("{conference}-d{day}-s{n}"),
        room_name: format!("Room {n}"),
        start,
        end: start + chrono::Duration::minutes(50),
        talk: None,
    }
}

pub fn speaker(uuid: &str) -> Speaker {
    Speaker {
        uuid: uuid.to_string(),
        first_name: "Ada".into(),
        last_name: uuid.to_uppercase(),
        company: None,
        avatar_url: None,
        bio: None,
        accepted_talks: Vec::new(),
        details_retrieved: false,
    }
}

#[async_trait]
impl CfpApi for ScriptedApi {
    async fn schedule_links(&self, conference: &Conference) -> SyncResult<Vec<ScheduleLink>> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        let count = self.days.lock().unwrap().len();
        Ok((1..=count)
            .map(|day| ScheduleLink {
                href: format!("conferences/{}/schedules/day{day}/", conference.id()),
                title: day.to_string(),
            })
            .collect())
    }

    async fn day_sessions(&self, conference: &Conference, link: &ScheduleLink) -> SyncResult<Vec<Session>> {
        self.day_calls.fetch_add(1, Ordering::SeqCst);
        let gated = match self.gated_conference.lock().unwrap().as_deref() {
            Some(id) => id == conference.id(),
            None => true,
        };
        if gated {
            let _permit = self.day_gate.acquire().await.map_err(|e| SyncError::remote(&link.href, e))?;
        }
        let day: usize = link.title.parse().unwrap_or(1);
        let script = self.days.lock().unwrap()[day - 1];
        match script {
            Day::Ready(count) => Ok((0..count).map(|n| session(conference.id(), day, n)).collect()),
            Day::Never => std::future::pending().await,
            Day::Fail => Err(SyncError::remote(&link.href, "status 500")),
        }
    }

    async fn speakers(&self, _conference: &Conference) -> SyncResult<Vec<Speaker>> {
        self.speaker_list_calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .speakers_gate
            .acquire()
            .await
            .map_err(|e| SyncError::remote("speakers", e))?;
        Ok(vec![speaker("s-1"), speaker("s-2")])
    }

    async fn speaker(&self, _conference: &Conference, uuid: &str) -> SyncResult<Speaker> {
        self.speaker_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Speaker {
            bio: Some(format!("Bio of {uuid}")),
            company: Some("Devoxx".into()),
            ..speaker(uuid)
        }
        .into_detailed())
    }

    async fn tracks(&self, _conference: &Conference) -> SyncResult<Vec<Track>> {
        Ok(vec![Track {
            id: "java".into(),
            title: "Java".into(),
            description: String::new(),
            image_url: None,
        }])
    }

    async fn proposal_types(&self, _conference: &Conference) -> SyncResult<Vec<ProposalType>> {
        Ok(vec![ProposalType {
            id: "conf".into(),
            label: "Conference".into(),
            description: String::new(),
        }])
    }
}

/// A list store counting its loads.
#[derive(Default)]
pub struct CountingListStore {
    pub inner: InMemoryListStore,
    pub loads: AtomicUsize,
}

#[async_trait]
impl ListStore for CountingListStore {
    async fn load(&self, owner: &str, kind: ListKind) -> SyncResult<Vec<UserListItem>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(owner, kind).await
    }

    async fn put(&self, owner: &str, kind: ListKind, item: &UserListItem) -> SyncResult<()> {
        self.inner.put(owner, kind, item).await
    }

    async fn delete(&self, owner: &str, kind: ListKind, id: &str) -> SyncResult<()> {
        self.inner.delete(owner, kind, id).await
    }
}

pub fn conference(id: &str) -> Conference {
    Conference::new(
        id,
        "Europe/Brussels",
        NaiveDate::from_ymd_opt(2018, 11, 12).unwrap(),
        NaiveDate::from_ymd_opt(2018, 11, 16).unwrap(),
        "https://cfp.devoxx.be/api",
    )
    .unwrap()
}

pub struct Harness {
    pub engine: SyncEngine,
    pub api: Arc<ScriptedApi>,
    pub auth: Arc<StaticAuthProvider>,
    pub functions: Arc<RecordingCloudFunctions>,
    pub local: Arc<CountingListStore>,
    pub cloud: Arc<CountingListStore>,
}

pub fn harness(root: Option<&Path>, api: Arc<ScriptedApi>, fan_in_timeout: Duration) -> Harness {
    let storage: Arc<dyn StorageProvider> = match root {
        Some(root) => Arc::new(DirectoryStorage::new(root)),
        None => Arc::new(NoStorage),
    };
    let auth = Arc::new(StaticAuthProvider::signed_out());
    let functions = Arc::new(RecordingCloudFunctions::new());
    let local = Arc::new(CountingListStore::default());
    let cloud = Arc::new(CountingListStore::default());
    let deps = EngineDeps {
        storage,
        api: api.clone(),
        functions: functions.clone(),
        auth: auth.clone(),
        settings: Arc::new(InMemorySettings::new()),
        local_lists: local.clone(),
        cloud_lists: cloud.clone(),
    };
    let options = EngineOptions {
        fan_in_timeout,
        ..EngineOptions::default()
    };
    Harness {
        engine: SyncEngine::start(options, deps),
        api,
        auth,
        functions,
        local,
        cloud,
    }
}

impl Harness {
    pub fn sign_in(&self) {
        self.auth.sign_in(AuthenticatedUser::new(USER, Some("user@example.org")));
        self.engine.authentication_changed();
    }
}

pub fn write_cached_sessions(root: &Path, conference: &str, sessions: &[Session]) {
    let dir = root.join(conference);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("sessions.json"), serde_json::to_vec(sessions).unwrap()).unwrap();
}

pub fn read_cached_sessions(root: &Path, conference: &str) -> Vec<Session> {
    let raw = std::fs::read(root.join(conference).join("sessions.json")).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

pub fn ids<T>(items: &[T], key: impl Fn(&T) -> String) -> Vec<String> {
    items.iter().map(key).collect()
}

/// Polls `check` for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
