//! # On-device storage
//!
//! Private directory resolution, the per-conference JSON cache, and the
//! file-backed local store for user lists.

/// Per-conference, per-resource JSON snapshots.
pub mod cache_store;
/// Key/value collections for user lists (local store and cloud mirror seam).
pub mod list_store;
/// Private directory resolution.
pub mod storage_provider;

pub use cache_store::LocalCacheStore;
pub use list_store::{InMemoryListStore, JsonFileListStore, ListStore};
pub use storage_provider::{DirectoryStorage, NoStorage, PlatformStorage, StorageProvider};
