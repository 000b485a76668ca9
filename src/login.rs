//! Credential and provider-code login flows.
//!
//! Input is validated before anything touches the network. A successful
//! credential login sets the token pair first and then fetches the profile,
//! in that order; a rejected login leaves the session untouched so the user
//! can retry from the form.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::api::{AuthApi, Provider, RawLoginOutcome};
use crate::error::{AuthError, Result};
use crate::session::SessionStore;

pub struct LoginFlow {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
}

impl LoginFlow {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        Self { api, store }
    }

    /// Logs in with email and password, then hydrates the profile.
    ///
    /// The `remember` preference is forwarded on the wire but has no effect
    /// on session semantics.
    ///
    /// # Errors
    /// `Validation` on empty trimmed input (no request sent), `Rejected`
    /// with the server's message on bad credentials.
    pub async fn login_with_credentials(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<()> {
        let email = email.trim();
        let password = password.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("email is required"));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required"));
        }

        let password = SecretString::from(password.to_string());
        let tokens = self.api.login(email, &password, remember).await?;
        self.store.set_tokens(&tokens);
        info!("Credential login succeeded; fetching profile");
        self.store.fetch_session(self.api.as_ref()).await
    }

    /// Exchanges a provider authorization code for a login outcome. The
    /// outcome is resolved by [`CallbackResolver`](crate::oauth::CallbackResolver);
    /// no session mutation happens here.
    ///
    /// # Errors
    /// `Validation` on an empty code, otherwise whatever the exchange
    /// endpoint reports.
    pub async fn login_with_provider(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<RawLoginOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::Validation("authorization code is required"));
        }
        self.api.exchange_oauth_code(provider, code).await
    }

    /// Explicit logout: drops tokens and profile together.
    pub fn logout(&self) {
        info!("Logging out");
        self.store.clear();
    }
}
