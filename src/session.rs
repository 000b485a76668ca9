//! Session store: the single source of truth for "am I logged in".
//!
//! The store holds the bearer token pair and the user profile behind one
//! lock so readers always observe them together. The profile is only ever
//! populated while a token is held, and `clear` drops both in the same
//! write. Flows detect that the session they started against is gone by
//! comparing the epoch counter, which bumps on every token change.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::api::{AuthApi, Role, TokenPair, UserProfile};
use crate::error::{AuthError, Result};

/// Authenticated state snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token must be refreshed.
    pub expires_in: u64,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Default)]
struct Inner {
    session: Session,
    epoch: u64,
}

/// Shared handle to the session state. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the token pair. Does not populate the profile; callers
    /// follow up with [`fetch_session`](Self::fetch_session).
    pub fn set_tokens(&self, tokens: &TokenPair) {
        let mut inner = self.write();
        inner.session.access_token = tokens.access_token.clone();
        inner.session.refresh_token = tokens.refresh_token.clone();
        inner.session.expires_in = tokens.access_token_expires_in;
        // A new token pair invalidates any profile fetched for the old one.
        inner.session.user = None;
        inner.epoch += 1;
    }

    /// Replaces the user profile. Ignored when no token is held, so a stale
    /// profile response cannot resurrect a cleared session.
    pub fn set_user(&self, user: UserProfile) {
        let mut inner = self.write();
        if inner.session.access_token.is_empty() {
            warn!("Dropping profile update: no access token held");
            return;
        }
        inner.session.user = Some(user);
    }

    /// Clears tokens and profile together.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.session = Session::default();
        inner.epoch += 1;
    }

    /// Fetches the current profile for the held token. This is the recovery
    /// path used when the app boots with a token but no cached user.
    ///
    /// # Errors
    /// `SessionInvalid` when the server no longer accepts the token; the
    /// store is cleared before returning. Every other failure (transport,
    /// transient server rejection) leaves the store as-is and propagates
    /// unchanged.
    pub async fn fetch_session(&self, api: &dyn AuthApi) -> Result<()> {
        let Some(token) = self.access_token() else {
            debug!("No access token held; nothing to recover");
            return Ok(());
        };
        let epoch = self.epoch();
        match api.me(&token).await {
            Ok(user) => {
                if self.epoch() == epoch {
                    self.set_user(user);
                } else {
                    debug!("Session changed during profile fetch; dropping result");
                }
                Ok(())
            }
            Err(AuthError::SessionInvalid) => {
                warn!("Access token rejected; clearing session");
                self.clear();
                Err(AuthError::SessionInvalid)
            }
            Err(other) => Err(other),
        }
    }

    /// The held access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        let inner = self.read();
        if inner.session.access_token.is_empty() {
            None
        } else {
            Some(inner.session.access_token.clone())
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.read().session.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.read().session.user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let inner = self.read();
        !inner.session.access_token.is_empty() && inner.session.user.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.read()
            .session
            .user
            .as_ref()
            .is_some_and(|user| user.role == Role::Admin)
    }

    /// Monotonic counter bumped on every token change or clear.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Provider;

    fn tokens() -> TokenPair {
        TokenPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            access_token_expires_in: 1800,
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: 42,
            email: "jiwoo@moyo.app".to_string(),
            nickname: "지우".to_string(),
            role: Role::User,
            otp_enabled: false,
            oauth_connections: vec![],
        }
    }

    #[test]
    fn user_requires_token() {
        let store = SessionStore::new();
        store.set_user(profile());
        assert!(store.user().is_none());

        store.set_tokens(&tokens());
        store.set_user(profile());
        assert!(store.is_authenticated());
    }

    #[test]
    fn clear_drops_tokens_and_user_together() {
        let store = SessionStore::new();
        store.set_tokens(&tokens());
        store.set_user(profile());
        store.clear();
        let session = store.snapshot();
        assert!(session.access_token.is_empty());
        assert!(session.user.is_none());
    }

    #[test]
    fn new_tokens_invalidate_old_profile() {
        let store = SessionStore::new();
        store.set_tokens(&tokens());
        store.set_user(profile());
        store.set_tokens(&TokenPair {
            access_token: "access-2".to_string(),
            refresh_token: "refresh-2".to_string(),
            access_token_expires_in: 1800,
        });
        assert!(store.user().is_none());
    }

    #[test]
    fn epoch_bumps_on_token_changes_only() {
        let store = SessionStore::new();
        let start = store.epoch();
        store.set_tokens(&tokens());
        store.set_user(profile());
        assert_eq!(store.epoch(), start + 1);
        store.clear();
        assert_eq!(store.epoch(), start + 2);
    }

    #[test]
    fn admin_role_is_derived() {
        let store = SessionStore::new();
        store.set_tokens(&tokens());
        store.set_user(UserProfile {
            role: Role::Admin,
            oauth_connections: vec![crate::api::OAuthConnection {
                provider: Provider::Kakao,
                oauth_id: 1,
                provider_user_id: "p-1".to_string(),
                release_date: None,
            }],
            ..profile()
        });
        assert!(store.is_admin());
    }
}
