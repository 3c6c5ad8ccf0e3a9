//! Resolution of the private per-install directory.

use std::path::PathBuf;

use tracing::warn;

/// Resolves the private directory holding cache files and the reload marker.
/// `None` means no storage is accessible and caching is skipped.
pub trait StorageProvider: Send + Sync {
    fn private_root(&self) -> Option<PathBuf>;
}

/// A fixed directory, created on first use.
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageProvider for DirectoryStorage {
    fn private_root(&self) -> Option<PathBuf> {
        match std::fs::create_dir_all(&self.root) {
            Ok(()) => Some(self.root.clone()),
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "private storage unavailable");
                None
            }
        }
    }
}

/// The platform's local data directory, e.g. `~/.local/share/<app>` on Linux.
pub struct PlatformStorage {
    app_name: String,
}

impl PlatformStorage {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }
}

impl StorageProvider for PlatformStorage {
    fn private_root(&self) -> Option<PathBuf> {
        let root = dirs::data_local_dir()?.join(&self.app_name);
        DirectoryStorage::new(root).private_root()
    }
}

/// No storage at all; every load is remote-only.
pub struct NoStorage;

impl StorageProvider for NoStorage {
    fn private_root(&self) -> Option<PathBuf> {
        None
    }
}
