//! Authenticated-user provider.

use std::sync::{PoisonError, RwLock};

/// The signed-in user as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Stable key owning every user-scoped item.
    pub key: String,
    pub email: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(key: &str, email: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            email: email.map(str::to_string),
        }
    }
}

/// `None` means nobody is signed in; user-scoped operations then fail with a
/// precondition error.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthenticatedUser>;
}

/// A provider whose user is set explicitly, by the host app or a test.
#[derive(Default)]
pub struct StaticAuthProvider {
    user: RwLock<Option<AuthenticatedUser>>,
}

impl StaticAuthProvider {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user: AuthenticatedUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: AuthenticatedUser) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthProvider for StaticAuthProvider {
    fn current_user(&self) -> Option<AuthenticatedUser> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
