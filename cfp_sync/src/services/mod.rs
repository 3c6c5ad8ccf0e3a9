//! # Platform Services
//!
//! Collaborators the host application provides: who is signed in and where
//! small settings are kept.

/// Authenticated-user provider.
pub mod auth;
/// String key/value settings.
pub mod settings;

pub use auth::{AuthProvider, AuthenticatedUser, StaticAuthProvider};
pub use settings::{verified_account_key, InMemorySettings, JsonFileSettings, SettingsStore};
