//! Schedule slots as served by the per-day schedule endpoint.

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Identified;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "slotId")]
    pub id: String,
    #[serde(default)]
    pub room_name: String,
    #[serde(rename = "fromTimeMillis", with = "ts_milliseconds")]
    pub start: DateTime<Utc>,
    #[serde(rename = "toTimeMillis", with = "ts_milliseconds")]
    pub end: DateTime<Utc>,
    /// `None` for breaks.
    #[serde(default)]
    pub talk: Option<Talk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Talk {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub track_id: String,
    #[serde(default)]
    pub talk_type: String,
    #[serde(default)]
    pub speakers: Vec<SpeakerRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerRef {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
}

/// Body of one day's schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub slots: Vec<Session>,
}

impl Session {
    pub fn is_break(&self) -> bool {
        self.talk.is_none()
    }

    pub fn talk_id(&self) -> Option<&str> {
        self.talk.as_ref().map(|talk| talk.id.as_str())
    }
}

impl Identified for Session {
    fn key(&self) -> &str {
        &self.id
    }
}
