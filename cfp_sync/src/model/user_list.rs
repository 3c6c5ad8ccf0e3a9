//! # User-scoped lists
//!
//! Favorites, scheduled sessions, notes and votes all share one item shape.
//! Reconciliation only ever looks at `id`; the payload travels untouched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Identified;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListKind {
    Favorites,
    Scheduled,
    Notes,
    Votes,
}

impl ListKind {
    pub const ALL: [ListKind; 4] = [
        ListKind::Favorites,
        ListKind::Scheduled,
        ListKind::Notes,
        ListKind::Votes,
    ];

    /// Name of the collection in both the local store and the cloud mirror.
    pub fn collection(&self) -> &'static str {
        match self {
            ListKind::Favorites => "favorites",
            ListKind::Scheduled => "scheduled",
            ListKind::Notes => "notes",
            ListKind::Votes => "votes",
        }
    }

    /// Cloud functions mirroring a local add/remove, for the kinds that have them.
    pub fn remote_functions(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ListKind::Favorites => Some(("addFavorite", "removeFavorite")),
            ListKind::Scheduled => Some(("addScheduled", "removeScheduled")),
            ListKind::Notes | ListKind::Votes => None,
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListPayload {
    #[serde(rename_all = "camelCase")]
    Favorite { talk_id: String },
    #[serde(rename_all = "camelCase")]
    Scheduled { talk_id: String },
    #[serde(rename_all = "camelCase")]
    Note {
        talk_id: String,
        title: String,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Vote {
        talk_id: String,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
}

impl ListPayload {
    pub fn talk_id(&self) -> &str {
        match self {
            ListPayload::Favorite { talk_id }
            | ListPayload::Scheduled { talk_id }
            | ListPayload::Note { talk_id, .. }
            | ListPayload::Vote { talk_id, .. } => talk_id,
        }
    }

    pub fn kind(&self) -> ListKind {
        match self {
            ListPayload::Favorite { .. } => ListKind::Favorites,
            ListPayload::Scheduled { .. } => ListKind::Scheduled,
            ListPayload::Note { .. } => ListKind::Notes,
            ListPayload::Vote { .. } => ListKind::Votes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListItem {
    pub id: String,
    /// Key of the authenticated user owning the item.
    pub owner: String,
    pub payload: ListPayload,
}

impl UserListItem {
    /// Creates an item with a fresh uuid.
    pub fn new(owner: &str, payload: ListPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            payload,
        }
    }

    pub fn with_id(id: &str, owner: &str, payload: ListPayload) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            payload,
        }
    }

    pub fn talk_id(&self) -> &str {
        self.payload.talk_id()
    }

    pub fn kind(&self) -> ListKind {
        self.payload.kind()
    }
}

impl Identified for UserListItem {
    fn key(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::{ListKind, ListPayload, UserListItem};

    #[test]
    fn payload_serializes_with_type_tag() {
        let item = UserListItem::with_id(
            "n-1",
            "user-1",
            ListPayload::Note {
                talk_id: "T1".into(),
                title: "Remember".into(),
                content: "Slides link".into(),
            },
        );
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["payload"]["type"], "note");
        assert_eq!(value["payload"]["talkId"], "T1");
        assert_eq!(item.kind(), ListKind::Notes);
    }

    #[test]
    fn only_favorites_and_scheduled_call_remote_functions() {
        assert!(ListKind::Favorites.remote_functions().is_some());
        assert!(ListKind::Scheduled.remote_functions().is_some());
        assert!(ListKind::Notes.remote_functions().is_none());
        assert!(ListKind::Votes.remote_functions().is_none());
    }

    #[test]
    fn new_items_get_distinct_ids() {
        let payload = ListPayload::Favorite { talk_id: "T1".into() };
        let a = UserListItem::new("u", payload.clone());
        let b = UserListItem::new("u", payload);
        assert_ne!(a.id, b.id);
    }
}
