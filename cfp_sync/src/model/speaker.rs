use serde::{Deserialize, Serialize};

use super::Identified;

/// A speaker record.
///
/// The bulk speakers endpoint returns summaries; the per-speaker endpoint
/// returns the full record. `details_retrieved` tells the two apart and is
/// persisted with the cache so a hydrated record survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    pub uuid: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default, rename = "avatarURL")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub accepted_talks: Vec<AcceptedTalk>,
    #[serde(default)]
    pub details_retrieved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTalk {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub talk_type: String,
}

impl Speaker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Marks a record returned by the per-speaker endpoint as hydrated.
    pub fn into_detailed(mut self) -> Self {
        self.details_retrieved = true;
        self
    }
}

impl Identified for Speaker {
    fn key(&self) -> &str {
        &self.uuid
    }
}
