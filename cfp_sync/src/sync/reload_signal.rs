//! # Reload Invalidation Signal
//!
//! A push channel delivers an opaque text payload naming a conference whose
//! data changed server side. The payload is stored verbatim as a marker file
//! at the storage root and examined at the next checkpoint. When it names the
//! selected conference the marker is consumed and the caller forces a fresh
//! refresh cycle.

use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::storage::LocalCacheStore;

const BODY_KEY: &str = "body";

/// Best-effort scan of a reload payload: quotes, braces and whitespace are
/// stripped, the rest is split on `,`, `:` and `=`, and the segment after the
/// `body` key is the conference id.
pub fn extract_conference_id(payload: &str) -> Option<String> {
    let cleaned: String = payload
        .chars()
        .filter(|c| !matches!(c, '"' | '{' | '}') && !c.is_whitespace())
        .collect();
    let mut segments = cleaned.split([',', ':', '=']);
    while let Some(segment) = segments.next() {
        if segment == BODY_KEY {
            return segments
                .next()
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }
    }
    None
}

#[derive(Clone)]
pub struct ReloadSignal {
    cache: LocalCacheStore,
}

impl ReloadSignal {
    pub fn new(cache: LocalCacheStore) -> Self {
        Self { cache }
    }

    /// Stores `payload` as the marker. Returns false when there is no storage
    /// and the payload was dropped.
    pub async fn receive(&self, payload: &str) -> SyncResult<bool> {
        let Some(marker) = self.cache.marker_path() else {
            warn!("no private storage, dropping reload payload");
            return Ok(false);
        };
        fs::write(&marker, payload).await?;
        debug!(path = %marker.display(), "reload marker written");
        Ok(true)
    }

    /// Conference named by the stored marker, if any.
    pub async fn pending_conference(&self) -> Option<String> {
        let marker = self.cache.marker_path()?;
        let payload = fs::read_to_string(&marker).await.ok()?;
        let conference = extract_conference_id(&payload);
        if conference.is_none() {
            debug!("reload marker names no conference, keeping it");
        }
        conference
    }

    /// Deletes the marker when it names `conference_id`. Returns whether it did.
    pub async fn take_if_matches(&self, conference_id: &str) -> SyncResult<bool> {
        match self.pending_conference().await {
            Some(pending) if pending == conference_id => {
                if let Some(marker) = self.cache.marker_path() {
                    fs::remove_file(&marker).await?;
                }
                info!(conference = conference_id, "reload marker consumed");
                Ok(true)
            }
            Some(other) => {
                debug!(marker = %other, active = conference_id, "reload marker is for another conference");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
