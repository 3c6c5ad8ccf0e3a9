//! # Local Cache Store
//!
//! One JSON file per `(conference, resource)` under the private storage root:
//! `<root>/<conference>/<resource>.json`. A missing file, missing storage or a
//! file that fails to parse are all the same thing to callers: a cache miss.
//! Writers do not lock; each write lands in a temporary sibling and is renamed
//! over the target, so the last successful writer wins and readers never see
//! a torn file.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};
use url::form_urlencoded;
use uuid::Uuid;

use super::storage_provider::StorageProvider;
use crate::error::{SyncError, SyncResult};
use crate::model::ResourceType;

const RELOAD_MARKER_FILE: &str = "reload";

#[derive(Clone)]
pub struct LocalCacheStore {
    storage: Arc<dyn StorageProvider>,
}

impl LocalCacheStore {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.storage.private_root()
    }

    pub fn cache_path(&self, conference_id: &str, resource: ResourceType) -> Option<PathBuf> {
        Some(
            self.root()?
                .join(sanitize_segment(conference_id))
                .join(format!("{}.json", resource.file_stem())),
        )
    }

    /// Location of the reload marker, at the storage root.
    pub fn marker_path(&self) -> Option<PathBuf> {
        Some(self.root()?.join(RELOAD_MARKER_FILE))
    }

    /// Reads a cached snapshot. Every failure is reported as [`SyncError::CacheMiss`].
    pub async fn read<T: DeserializeOwned>(
        &self,
        conference_id: &str,
        resource: ResourceType,
    ) -> SyncResult<Vec<T>> {
        let miss = || SyncError::CacheMiss {
            conference: conference_id.to_string(),
            resource: resource.to_string(),
        };
        let path = self.cache_path(conference_id, resource).ok_or_else(miss)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no cache file");
                return Err(miss());
            }
        };
        serde_json::from_slice::<Vec<T>>(&raw).map_err(|e| {
            warn!(path = %path.display(), error = %e, "cache file unreadable, treating as miss");
            miss()
        })
    }

    /// Overwrites a cached snapshot. Returns `false` when no storage is available.
    pub async fn write<T: Serialize>(
        &self,
        conference_id: &str,
        resource: ResourceType,
        items: &[T],
    ) -> SyncResult<bool> {
        let Some(path) = self.cache_path(conference_id, resource) else {
            debug!(%resource, "no private storage, skipping cache write");
            return Ok(false);
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(items)?;
        let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&staging, &body).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), count = items.len(), "cache file written");
        Ok(true)
    }
}

/// Encodes an id as a single path segment. The encoding is reversible, so
/// distinct ids never share a directory, and `.` and `/` are escaped.
pub(crate) fn sanitize_segment(value: &str) -> String {
    if value.is_empty() {
        return "%".to_string();
    }
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('.', "%2E")
}
