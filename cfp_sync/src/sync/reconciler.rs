//! # User List Reconciler
//!
//! Each user list lives in a local authoritative store and in a cloud mirror.
//! Once per authenticated session and list type the two are merged with a
//! simple presence rule: cloud-only items are inserted locally, local-only
//! items are removed locally. After the merge, local changes made by the user
//! are written through to the cloud for the rest of the session.
//!
//! Every mutation carries a [`ChangeOrigin`]. The local writer persists all of
//! them; the cloud binder mirrors only [`ChangeOrigin::User`] changes, so the
//! merge itself never echoes back to the cloud.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::ActiveConference;
use crate::core::{ObservableList, UiContext};
use crate::error::{SyncError, SyncResult};
use crate::model::{Identified, ListKind, ListPayload, UserListItem};
use crate::retrieve::CloudFunctions;
use crate::storage::ListStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Made by the user through a [`UserList`] handle.
    User,
    /// Applied by the merge.
    Reconcile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListChange {
    Added { item: UserListItem, origin: ChangeOrigin },
    Removed { item: UserListItem, origin: ChangeOrigin },
}

impl ListChange {
    pub fn origin(&self) -> ChangeOrigin {
        match self {
            ListChange::Added { origin, .. } | ListChange::Removed { origin, .. } => *origin,
        }
    }

    pub fn item(&self) -> &UserListItem {
        match self {
            ListChange::Added { item, .. } | ListChange::Removed { item, .. } => item,
        }
    }
}

/// What a merge does to the local list.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergePlan {
    pub insert: Vec<UserListItem>,
    pub remove: Vec<String>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.remove.is_empty()
    }
}

/// Presence-only merge: cloud wins on which ids exist. Running it against its
/// own result yields an empty plan.
pub fn plan_merge(local: &[UserListItem], cloud: &[UserListItem]) -> MergePlan {
    let local_ids: HashSet<&str> = local.iter().map(Identified::key).collect();
    let cloud_ids: HashSet<&str> = cloud.iter().map(Identified::key).collect();

    let mut seen = HashSet::new();
    let insert = cloud
        .iter()
        .filter(|item| !local_ids.contains(item.key()) && seen.insert(item.key()))
        .cloned()
        .collect();
    let remove = local
        .iter()
        .filter(|item| !cloud_ids.contains(item.key()))
        .map(|item| item.id.clone())
        .collect();
    MergePlan { insert, remove }
}

struct UserListInner {
    kind: ListKind,
    owner: String,
    items: ObservableList<UserListItem>,
    ui: UiContext,
    observers: Mutex<Vec<mpsc::UnboundedSender<ListChange>>>,
}

/// Handle to one user-scoped list of the signed-in user.
#[derive(Clone)]
pub struct UserList {
    inner: Arc<UserListInner>,
}

impl UserList {
    pub(crate) fn new(kind: ListKind, owner: &str, ui: UiContext) -> Self {
        Self {
            inner: Arc::new(UserListInner {
                kind,
                owner: owner.to_string(),
                items: ObservableList::new(),
                ui,
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn kind(&self) -> ListKind {
        self.inner.kind
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn items(&self) -> ObservableList<UserListItem> {
        self.inner.items.clone()
    }

    pub fn find_by_talk(&self, talk_id: &str) -> Option<UserListItem> {
        self.inner
            .items
            .snapshot()
            .iter()
            .find(|item| item.talk_id() == talk_id)
            .cloned()
    }

    pub fn contains_talk(&self, talk_id: &str) -> bool {
        self.find_by_talk(talk_id).is_some()
    }

    /// Adds `item`. Returns false when an item with the same id is present.
    pub async fn add(&self, item: UserListItem) -> SyncResult<bool> {
        if item.kind() != self.kind() {
            return Err(SyncError::Precondition(format!(
                "a {} item cannot be added to {}",
                item.kind(),
                self.kind()
            )));
        }
        let list = self.clone();
        let item = UserListItem {
            owner: self.owner().to_string(),
            ..item
        };
        self.inner.ui.run(move || list.apply_add(item, ChangeOrigin::User)).await
    }

    /// Adds a favorite or scheduled entry for `talk_id` unless one exists.
    pub async fn add_talk(&self, talk_id: &str) -> SyncResult<bool> {
        let payload = match self.kind() {
            ListKind::Favorites => ListPayload::Favorite {
                talk_id: talk_id.to_string(),
            },
            ListKind::Scheduled => ListPayload::Scheduled {
                talk_id: talk_id.to_string(),
            },
            other => {
                return Err(SyncError::Precondition(format!("{other} entries need a full payload")));
            }
        };
        if self.contains_talk(talk_id) {
            return Ok(false);
        }
        self.add(UserListItem::new(self.owner(), payload)).await
    }

    /// Removes the item with `id`. Returns false when it is absent.
    pub async fn remove(&self, id: &str) -> SyncResult<bool> {
        let list = self.clone();
        let id = id.to_string();
        self.inner
            .ui
            .run(move || list.apply_remove(&id, ChangeOrigin::User).is_some())
            .await
    }

    /// Removes every item referring to `talk_id`. Returns how many were removed.
    pub async fn remove_talk(&self, talk_id: &str) -> SyncResult<usize> {
        let list = self.clone();
        let talk_id = talk_id.to_string();
        self.inner
            .ui
            .run(move || {
                let ids: Vec<String> = list
                    .inner
                    .items
                    .snapshot()
                    .iter()
                    .filter(|item| item.talk_id() == talk_id)
                    .map(|item| item.id.clone())
                    .collect();
                ids.iter()
                    .filter(|id| list.apply_remove(id, ChangeOrigin::User).is_some())
                    .count()
            })
            .await
    }

    /// Registers a change observer. Call on the UI context so the observer
    /// sees exactly the changes applied after this point.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<ListChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers().push(tx);
        rx
    }

    pub(crate) fn publish_loaded(&self, items: Vec<UserListItem>) {
        self.inner.items.replace_all(items);
    }

    /// Applies a merge plan with [`ChangeOrigin::Reconcile`]. Returns `(inserted, removed)`.
    pub(crate) fn apply_plan(&self, plan: &MergePlan) -> (usize, usize) {
        let inserted = plan
            .insert
            .iter()
            .filter(|item| self.apply_add((*item).clone(), ChangeOrigin::Reconcile))
            .count();
        let removed = plan
            .remove
            .iter()
            .filter(|id| self.apply_remove(id, ChangeOrigin::Reconcile).is_some())
            .count();
        (inserted, removed)
    }

    fn apply_add(&self, item: UserListItem, origin: ChangeOrigin) -> bool {
        let added = item.clone();
        let changed = self.inner.items.edit(|items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return false;
            }
            items.push(item);
            true
        });
        if changed {
            self.notify(ListChange::Added { item: added, origin });
        }
        changed
    }

    fn apply_remove(&self, id: &str, origin: ChangeOrigin) -> Option<UserListItem> {
        let mut removed = None;
        self.inner.items.edit(|items| {
            let position = items.iter().position(|existing| existing.id == id);
            removed = position.map(|index| items.remove(index));
            removed.is_some()
        });
        let item = removed?;
        self.notify(ListChange::Removed {
            item: item.clone(),
            origin,
        });
        Some(item)
    }

    fn notify(&self, change: ListChange) {
        self.observers().retain(|observer| observer.send(change.clone()).is_ok());
    }

    fn observers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ListChange>>> {
        self.inner.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How a reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Cloud sync is disabled for this list; local is used as loaded.
    LocalOnly,
    /// The cloud mirror could not be read; no merge, no write-through.
    CloudUnavailable,
    Merged { inserted: usize, removed: usize },
}

/// Merges and binds user lists for one authenticated session.
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) ui: UiContext,
    pub(crate) local: Arc<dyn ListStore>,
    pub(crate) cloud: Arc<dyn ListStore>,
    pub(crate) functions: Arc<dyn CloudFunctions>,
    pub(crate) active: ActiveConference,
}

impl Reconciler {
    pub fn new(
        ui: UiContext,
        local: Arc<dyn ListStore>,
        cloud: Arc<dyn ListStore>,
        functions: Arc<dyn CloudFunctions>,
        active: ActiveConference,
    ) -> Self {
        Self {
            ui,
            local,
            cloud,
            functions,
            active,
        }
    }

    /// Loads `list`, merges it with the cloud mirror when `cloud_sync` is on
    /// and starts the write-through binding. Bindings stop when `cancel` fires.
    pub async fn run(&self, list: UserList, cloud_sync: bool, cancel: CancellationToken) -> SyncResult<ReconcileOutcome> {
        let kind = list.kind();
        let owner = list.owner().to_string();

        let writer_list = list.clone();
        let changes = self.ui.run(move || writer_list.subscribe()).await?;
        tokio::spawn(persist_locally(
            Arc::clone(&self.local),
            owner.clone(),
            kind,
            changes,
            cancel.clone(),
        ));

        let cloud_load = cloud_sync.then(|| {
            let cloud = Arc::clone(&self.cloud);
            let owner = owner.clone();
            tokio::spawn(async move { cloud.load(&owner, kind).await })
        });

        let local_items = match self.local.load(&owner, kind).await {
            Ok(items) => items,
            Err(e) => {
                warn!(list = %kind, error = %e, "local list unreadable, starting empty");
                Vec::new()
            }
        };
        let loaded = list.clone();
        self.ui.run(move || loaded.publish_loaded(local_items)).await?;

        let Some(cloud_load) = cloud_load else {
            debug!(list = %kind, "cloud sync disabled");
            return Ok(ReconcileOutcome::LocalOnly);
        };
        let cloud_items = match cloud_load.await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(list = %kind, error = %e, "cloud mirror unavailable, skipping merge");
                return Ok(ReconcileOutcome::CloudUnavailable);
            }
            Err(e) => {
                warn!(list = %kind, error = %e, "cloud mirror load did not finish, skipping merge");
                return Ok(ReconcileOutcome::CloudUnavailable);
            }
        };

        let merged = list.clone();
        let ((inserted, removed), user_changes) = self
            .ui
            .run(move || {
                let plan = plan_merge(&merged.items().snapshot(), &cloud_items);
                let counts = merged.apply_plan(&plan);
                (counts, merged.subscribe())
            })
            .await?;
        info!(list = %kind, inserted, removed, "user list reconciled");

        tokio::spawn(mirror_to_cloud(self.clone(), owner, kind, user_changes, cancel));
        Ok(ReconcileOutcome::Merged { inserted, removed })
    }

    async fn call_remote_function(&self, function: &'static str, owner: &str, talk_id: &str) {
        let Some(conference) = self.active.get() else {
            warn!(function, "no conference selected, skipping cloud function");
            return;
        };
        match self
            .functions
            .call(function, conference.cfp_endpoint(), owner, vec![json!(talk_id)])
            .await
        {
            Ok(_) => debug!(function, talk_id, "cloud function done"),
            Err(e) => warn!(function, talk_id, error = %e, "cloud function failed"),
        }
    }
}

async fn next_change(
    changes: &mut mpsc::UnboundedReceiver<ListChange>,
    cancel: &CancellationToken,
) -> Option<ListChange> {
    // Changes queued before cancellation are still delivered.
    tokio::select! {
        biased;
        change = changes.recv() => change,
        _ = cancel.cancelled() => None,
    }
}

async fn persist_locally(
    local: Arc<dyn ListStore>,
    owner: String,
    kind: ListKind,
    mut changes: mpsc::UnboundedReceiver<ListChange>,
    cancel: CancellationToken,
) {
    while let Some(change) = next_change(&mut changes, &cancel).await {
        let result = match &change {
            ListChange::Added { item, .. } => local.put(&owner, kind, item).await,
            ListChange::Removed { item, .. } => local.delete(&owner, kind, &item.id).await,
        };
        if let Err(e) = result {
            warn!(list = %kind, id = %change.item().id, error = %e, "local list write failed");
        }
    }
    debug!(list = %kind, "local writer stopped");
}

async fn mirror_to_cloud(
    reconciler: Reconciler,
    owner: String,
    kind: ListKind,
    mut changes: mpsc::UnboundedReceiver<ListChange>,
    cancel: CancellationToken,
) {
    while let Some(change) = next_change(&mut changes, &cancel).await {
        if change.origin() != ChangeOrigin::User {
            continue;
        }
        let result = match &change {
            ListChange::Added { item, .. } => reconciler.cloud.put(&owner, kind, item).await,
            ListChange::Removed { item, .. } => reconciler.cloud.delete(&owner, kind, &item.id).await,
        };
        if let Err(e) = result {
            warn!(list = %kind, id = %change.item().id, error = %e, "cloud mirror write failed");
        }

        // Fire and forget; an add and a remove of the same talk may reach the server in either order.
        if let Some((add, remove)) = kind.remote_functions() {
            let function = match change {
                ListChange::Added { .. } => add,
                ListChange::Removed { .. } => remove,
            };
            let reconciler = reconciler.clone();
            let owner = owner.clone();
            let talk_id = change.item().talk_id().to_string();
            tokio::spawn(async move { reconciler.call_remote_function(function, &owner, &talk_id).await });
        }
    }
    debug!(list = %kind, "cloud binding stopped");
}

#[cfg(test)]
mod tests {
    use super::{next_change, plan_merge, ChangeOrigin, ListChange, ReconcileOutcome, Reconciler, UserList};
    use crate::core::{ObservableValue, UiContext};
    use crate::model::{Conference, ListKind, ListPayload, UserListItem};
    use crate::retrieve::RecordingCloudFunctions;
    use crate::storage::{InMemoryListStore, ListStore};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const USER: &str = "user-1";

    fn favorite(id: &str) -> UserListItem {
        UserListItem::with_id(id, USER, ListPayload::Favorite { talk_id: id.into() })
    }

    fn ids(items: &[UserListItem]) -> Vec<String> {
        let mut ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        ids.sort();
        ids
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    struct Fixture {
        ui: UiContext,
        local: Arc<InMemoryListStore>,
        cloud: Arc<InMemoryListStore>,
        functions: Arc<RecordingCloudFunctions>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let (ui, _executor) = UiContext::spawn();
        let local = Arc::new(InMemoryListStore::new());
        let cloud = Arc::new(InMemoryListStore::new());
        let functions = Arc::new(RecordingCloudFunctions::new());
        let conference = Conference::new(
            "DVBE18",
            "Europe/Brussels",
            NaiveDate::from_ymd_opt(2018, 11, 12).unwrap(),
            NaiveDate::from_ymd_opt(2018, 11, 16).unwrap(),
            "https://cfp.devoxx.be/api",
        )
        .unwrap();
        let reconciler = Reconciler::new(
            ui.clone(),
            local.clone(),
            cloud.clone(),
            functions.clone(),
            ObservableValue::new(Some(Arc::new(conference))),
        );
        Fixture {
            ui,
            local,
            cloud,
            functions,
            reconciler,
        }
    }

    #[test]
    fn plan_inserts_cloud_only_and_removes_local_only() {
        let local = vec![favorite("T1"), favorite("T2")];
        let cloud = vec![favorite("T2"), favorite("T3"), favorite("T3")];
        let plan = plan_merge(&local, &cloud);
        assert_eq!(ids(&plan.insert), vec!["T3"]);
        assert_eq!(plan.remove, vec!["T1"]);
    }

    #[test]
    fn merging_a_merged_list_is_a_no_op() {
        let local = vec![favorite("T1"), favorite("T2")];
        let cloud = vec![favorite("T2"), favorite("T3")];
        let plan = plan_merge(&local, &cloud);
        let mut merged: Vec<UserListItem> = local
            .into_iter()
            .filter(|item| !plan.remove.contains(&item.id))
            .collect();
        merged.extend(plan.insert.clone());
        assert!(plan_merge(&merged, &cloud).is_empty());
    }

    #[tokio::test]
    async fn local_favorite_absent_from_cloud_is_removed() {
        let f = fixture();
        f.local.seed(USER, ListKind::Favorites, vec![favorite("T1")]);
        f.cloud.seed(USER, ListKind::Favorites, vec![favorite("T9")]);
        let list = UserList::new(ListKind::Favorites, USER, f.ui.clone());

        let outcome = f.reconciler.run(list.clone(), true, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Merged { inserted: 1, removed: 1 });
        assert_eq!(ids(&list.items().snapshot()), vec!["T9"]);
        let local = f.local.clone();
        eventually(|| ids(&local.items(USER, ListKind::Favorites)) == vec!["T9"]).await;
        // The merge is not echoed to the cloud or to the remote functions.
        assert_eq!(ids(&f.cloud.items(USER, ListKind::Favorites)), vec!["T9"]);
        assert!(f.functions.calls().is_empty());
    }

    #[tokio::test]
    async fn user_changes_after_merge_are_written_through() {
        let f = fixture();
        let list = UserList::new(ListKind::Favorites, USER, f.ui.clone());
        f.reconciler.run(list.clone(), true, CancellationToken::new()).await.unwrap();

        assert!(list.add_talk("T5").await.unwrap());
        assert!(!list.add_talk("T5").await.unwrap());
        let cloud = f.cloud.clone();
        eventually(|| cloud.items(USER, ListKind::Favorites).len() == 1).await;
        let functions = f.functions.clone();
        eventually(|| functions.calls_to("addFavorite").len() == 1).await;
        let call = &f.functions.calls_to("addFavorite")[0];
        assert_eq!(call.endpoint, "https://cfp.devoxx.be/api");
        assert_eq!(call.user_key, USER);
        assert_eq!(call.args, vec![serde_json::json!("T5")]);

        assert_eq!(list.remove_talk("T5").await.unwrap(), 1);
        eventually(|| cloud.items(USER, ListKind::Favorites).is_empty()).await;
        eventually(|| functions.calls_to("removeFavorite").len() == 1).await;
    }

    #[tokio::test]
    async fn cloud_failure_skips_merge_and_binding() {
        let f = fixture();
        f.local.seed(USER, ListKind::Scheduled, vec![favorite("T1")]);
        f.cloud.set_offline(true);
        let list = UserList::new(ListKind::Scheduled, USER, f.ui.clone());

        let outcome = f.reconciler.run(list.clone(), true, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::CloudUnavailable);
        assert_eq!(list.items().len(), 1);

        f.cloud.set_offline(false);
        list.add_talk("T2").await.unwrap();
        let local = f.local.clone();
        eventually(|| local.items(USER, ListKind::Scheduled).len() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.cloud.items(USER, ListKind::Scheduled).is_empty());
        assert!(f.functions.calls().is_empty());
    }

    #[tokio::test]
    async fn notes_without_cloud_sync_stay_local() {
        let f = fixture();
        let note = UserListItem::with_id(
            "n-1",
            USER,
            ListPayload::Note {
                talk_id: "T1".into(),
                title: "t".into(),
                content: "c".into(),
            },
        );
        f.local.seed(USER, ListKind::Notes, vec![note.clone()]);
        f.cloud.seed(USER, ListKind::Notes, Vec::new());
        let list = UserList::new(ListKind::Notes, USER, f.ui.clone());

        let outcome = f.reconciler.run(list.clone(), false, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::LocalOnly);
        assert_eq!(*list.items().snapshot(), vec![note]);
    }

    #[tokio::test]
    async fn cancelled_binding_stops_mirroring() {
        let f = fixture();
        let list = UserList::new(ListKind::Favorites, USER, f.ui.clone());
        let cancel = CancellationToken::new();
        f.reconciler.run(list.clone(), true, cancel.clone()).await.unwrap();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        list.add_talk("T1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.cloud.items(USER, ListKind::Favorites).is_empty());
        assert!(f.local.load(USER, ListKind::Favorites).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_changes_outlive_cancellation() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        for id in ["T1", "T2"] {
            tx.send(ListChange::Added {
                item: favorite(id),
                origin: ChangeOrigin::User,
            })
            .unwrap();
        }
        cancel.cancel();

        assert_eq!(next_change(&mut rx, &cancel).await.unwrap().item().id, "T1");
        assert_eq!(next_change(&mut rx, &cancel).await.unwrap().item().id, "T2");
        assert!(next_change(&mut rx, &cancel).await.is_none());
    }

    #[tokio::test]
    async fn change_made_right_before_cancel_is_persisted() {
        let f = fixture();
        let list = UserList::new(ListKind::Favorites, USER, f.ui.clone());
        let cancel = CancellationToken::new();
        f.reconciler.run(list.clone(), true, cancel.clone()).await.unwrap();

        list.add_talk("T3").await.unwrap();
        cancel.cancel();

        let local = f.local.clone();
        eventually(|| local.items(USER, ListKind::Favorites).len() == 1).await;
        let cloud = f.cloud.clone();
        eventually(|| cloud.items(USER, ListKind::Favorites).len() == 1).await;
    }

    #[tokio::test]
    async fn wrong_kind_is_a_precondition_error() {
        let f = fixture();
        let list = UserList::new(ListKind::Votes, USER, f.ui.clone());
        assert!(list.add(favorite("T1")).await.unwrap_err().is_precondition());
        assert!(list.add_talk("T1").await.unwrap_err().is_precondition());
    }

    #[test]
    fn change_accessors() {
        let change = ListChange::Removed {
            item: favorite("T1"),
            origin: ChangeOrigin::Reconcile,
        };
        assert_eq!(change.origin(), ChangeOrigin::Reconcile);
        assert_eq!(change.item().id, "T1");
    }
}
