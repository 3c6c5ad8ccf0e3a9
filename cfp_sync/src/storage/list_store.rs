//! # User list stores
//!
//! The reconciler sees both the local authoritative store and the cloud
//! mirror through the same opaque key/value seam. The file-backed store is
//! the on-device implementation; the in-memory store backs installs without
//! storage and stands in for a cloud mirror in tests and demos.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::cache_store::sanitize_segment;
use crate::error::{SyncError, SyncResult};
use crate::model::{ListKind, UserListItem};

#[async_trait]
pub trait ListStore: Send + Sync {
    async fn load(&self, owner: &str, kind: ListKind) -> SyncResult<Vec<UserListItem>>;

    /// Inserts or replaces the item with the same id.
    async fn put(&self, owner: &str, kind: ListKind, item: &UserListItem) -> SyncResult<()>;

    /// Removes the item with `id`; absent ids are not an error.
    async fn delete(&self, owner: &str, kind: ListKind, id: &str) -> SyncResult<()>;
}

type Collections = HashMap<(String, ListKind), Vec<UserListItem>>;

#[derive(Default)]
pub struct InMemoryListStore {
    collections: Mutex<Collections>,
    offline: AtomicBool,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a collection's contents.
    pub fn seed(&self, owner: &str, kind: ListKind, items: Vec<UserListItem>) {
        self.lock().insert((owner.to_string(), kind), items);
    }

    /// Current contents of a collection.
    pub fn items(&self, owner: &str, kind: ListKind) -> Vec<UserListItem> {
        self.lock()
            .get(&(owner.to_string(), kind))
            .cloned()
            .unwrap_or_default()
    }

    /// While offline, every operation fails with a remote failure.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self, kind: ListKind) -> SyncResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(SyncError::remote(kind.collection(), "store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn load(&self, owner: &str, kind: ListKind) -> SyncResult<Vec<UserListItem>> {
        self.check_online(kind)?;
        Ok(self.items(owner, kind))
    }

    async fn put(&self, owner: &str, kind: ListKind, item: &UserListItem) -> SyncResult<()> {
        self.check_online(kind)?;
        let mut collections = self.lock();
        let items = collections.entry((owner.to_string(), kind)).or_default();
        upsert(items, item);
        Ok(())
    }

    async fn delete(&self, owner: &str, kind: ListKind, id: &str) -> SyncResult<()> {
        self.check_online(kind)?;
        if let Some(items) = self.lock().get_mut(&(owner.to_string(), kind)) {
            items.retain(|existing| existing.id != id);
        }
        Ok(())
    }
}

/// Stores each collection as `<root>/users/<owner>/<collection>.json`.
pub struct JsonFileListStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileListStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path(&self, owner: &str, kind: ListKind) -> PathBuf {
        self.root
            .join("users")
            .join(sanitize_segment(owner))
            .join(format!("{}.json", kind.collection()))
    }

    async fn read_all(&self, owner: &str, kind: ListKind) -> SyncResult<Vec<UserListItem>> {
        let path = self.path(owner, kind);
        match fs::read(&path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, owner: &str, kind: ListKind, items: &[UserListItem]) -> SyncResult<()> {
        let path = self.path(owner, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(items)?).await?;
        fs::rename(&staging, &path).await?;
        debug!(path = %path.display(), count = items.len(), "user list written");
        Ok(())
    }
}

#[async_trait]
impl ListStore for JsonFileListStore {
    async fn load(&self, owner: &str, kind: ListKind) -> SyncResult<Vec<UserListItem>> {
        self.read_all(owner, kind).await
    }

    async fn put(&self, owner: &str, kind: ListKind, item: &UserListItem) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_all(owner, kind).await?;
        upsert(&mut items, item);
        self.write_all(owner, kind, &items).await
    }

    async fn delete(&self, owner: &str, kind: ListKind, id: &str) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_all(owner, kind).await?;
        let before = items.len();
        items.retain(|existing| existing.id != id);
        if items.len() == before {
            return Ok(());
        }
        self.write_all(owner, kind, &items).await
    }
}

fn upsert(items: &mut Vec<UserListItem>, item: &UserListItem) {
    match items.iter_mut().find(|existing| existing.id == item.id) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}
