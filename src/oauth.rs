//! OAuth provider linking and the callback state machine.
//!
//! A provider callback reports one of several partially-overlapping field
//! combinations. The raw wire shape is parsed into [`CallbackOutcome`] first
//! so each branch of the resolution only sees the fields that belong to it,
//! and the resolver turns exactly one outcome into exactly one terminal
//! [`Resolution`]. Resolution is single-use per resolver instance: the latch
//! is keyed to the callback's lifetime, not its content, so a re-rendered
//! view cannot re-trigger a transfer or connect call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{AuthApi, Provider, RawLoginOutcome, TokenPair};
use crate::error::{AuthError, Result};
use crate::session::SessionStore;

const STATUS_LOGIN: &str = "LOGIN";
const STATUS_NEED_REGISTER: &str = "NEED_REGISTER";
const STATUS_NEED_TRANSFER: &str = "NEED_TRANSFER";
const MODE_CONNECT: &str = "connect";

/// Whether the callback came from a login attempt or from connecting an
/// additional provider to an existing account.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkMode {
    Login,
    Connect,
}

impl LinkMode {
    fn parse(mode: Option<&str>) -> Self {
        if mode == Some(MODE_CONNECT) {
            Self::Connect
        } else {
            Self::Login
        }
    }
}

/// Parsed callback outcome. Each variant carries only the fields its
/// resolution branch needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallbackOutcome {
    /// The server already finished the exchange; tokens take priority over
    /// whatever `status` claims.
    Completed { tokens: TokenPair, mode: LinkMode },
    /// The social identity is attached to a different account.
    NeedTransfer {
        provider: Provider,
        provider_user_id: String,
        from_user_id: String,
    },
    /// The identity is unknown to the server.
    NeedRegister {
        provider: Provider,
        provider_user_id: String,
    },
    /// Connect-mode callback that matched nothing actionable.
    ConnectFallback,
    /// `LOGIN` reported without tokens; defensive no-op.
    LoginWithoutTokens,
}

impl CallbackOutcome {
    /// Parses the raw wire outcome, preserving the fall-through order of the
    /// resolution rules: tokens first, then transfer, register, the
    /// connect-mode fallback, and the token-less `LOGIN` case.
    ///
    /// # Errors
    /// `InvalidCallback` when nothing matches; that failure is terminal.
    pub fn parse(raw: &RawLoginOutcome) -> Result<Self> {
        if let (Some(access), Some(refresh)) =
            (non_empty(&raw.access_token), non_empty(&raw.refresh_token))
        {
            return Ok(Self::Completed {
                tokens: TokenPair {
                    access_token: access.to_string(),
                    refresh_token: refresh.to_string(),
                    access_token_expires_in: raw.access_token_expires_in.unwrap_or_default(),
                },
                mode: LinkMode::parse(raw.mode.as_deref()),
            });
        }

        let provider = raw.provider.as_deref().and_then(Provider::parse);
        let provider_user_id = non_empty(&raw.provider_user_id);

        if raw.status.as_deref() == Some(STATUS_NEED_TRANSFER) {
            if let (Some(provider), Some(provider_user_id), Some(from_user_id)) =
                (provider, provider_user_id, non_empty(&raw.from_user_id))
            {
                return Ok(Self::NeedTransfer {
                    provider,
                    provider_user_id: provider_user_id.to_string(),
                    from_user_id: from_user_id.to_string(),
                });
            }
        }

        if raw.status.as_deref() == Some(STATUS_NEED_REGISTER) {
            if let (Some(provider), Some(provider_user_id)) = (provider, provider_user_id) {
                return Ok(Self::NeedRegister {
                    provider,
                    provider_user_id: provider_user_id.to_string(),
                });
            }
        }

        if raw.mode.as_deref() == Some(MODE_CONNECT) {
            return Ok(Self::ConnectFallback);
        }

        if raw.status.as_deref() == Some(STATUS_LOGIN) {
            return Ok(Self::LoginWithoutTokens);
        }

        Err(AuthError::InvalidCallback)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Where the host should route after resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Navigation {
    Home,
    Account,
    Signup {
        provider: Provider,
        provider_user_id: String,
    },
}

/// Terminal result of a callback resolution. `notice` carries a user-facing
/// message for the non-fatal failure branches (failed transfer or connect).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub navigation: Navigation,
    pub notice: Option<String>,
}

impl Resolution {
    fn to(navigation: Navigation) -> Self {
        Self {
            navigation,
            notice: None,
        }
    }
}

/// Host-supplied confirmation gate for the irreversible transfer step.
#[async_trait]
pub trait TransferConfirmer: Send + Sync {
    async fn confirm_transfer(&self, provider: Provider, from_user_id: &str) -> bool;
}

/// Resolves one provider callback into one terminal action.
///
/// Create one resolver per callback instance; the one-shot latch rejects any
/// second invocation for the resolver's lifetime.
pub struct CallbackResolver {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    resolved: AtomicBool,
}

impl CallbackResolver {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        Self {
            api,
            store,
            resolved: AtomicBool::new(false),
        }
    }

    /// Resolves the callback.
    ///
    /// # Errors
    /// `CallbackConsumed` on any invocation after the first,
    /// `InvalidCallback` when the outcome is unusable (terminal; the host
    /// should show a generic error and route home), `SessionInvalid` when a
    /// branch that needs the current login finds none.
    pub async fn resolve(
        &self,
        raw: &RawLoginOutcome,
        confirmer: &dyn TransferConfirmer,
    ) -> Result<Resolution> {
        if self.resolved.swap(true, Ordering::SeqCst) {
            warn!("OAuth callback resolved twice; ignoring replay");
            return Err(AuthError::CallbackConsumed);
        }

        match CallbackOutcome::parse(raw)? {
            CallbackOutcome::Completed { tokens, mode } => {
                self.store.set_tokens(&tokens);
                self.store.fetch_session(self.api.as_ref()).await?;
                info!("OAuth login completed");
                Ok(match mode {
                    LinkMode::Connect => Resolution::to(Navigation::Account),
                    LinkMode::Login => Resolution::to(Navigation::Home),
                })
            }
            CallbackOutcome::NeedTransfer {
                provider,
                provider_user_id,
                from_user_id,
            } => {
                self.resolve_transfer(provider, &provider_user_id, &from_user_id, confirmer)
                    .await
            }
            CallbackOutcome::NeedRegister {
                provider,
                provider_user_id,
            } => self.resolve_register(provider, provider_user_id).await,
            CallbackOutcome::ConnectFallback => Ok(Resolution::to(Navigation::Account)),
            CallbackOutcome::LoginWithoutTokens => {
                warn!("LOGIN callback without tokens; routing home");
                Ok(Resolution::to(Navigation::Home))
            }
        }
    }

    /// The identity belongs to another account; re-linking is irreversible,
    /// so nothing happens without explicit confirmation. A failed transfer
    /// leaves the current session untouched.
    async fn resolve_transfer(
        &self,
        provider: Provider,
        provider_user_id: &str,
        from_user_id: &str,
        confirmer: &dyn TransferConfirmer,
    ) -> Result<Resolution> {
        if !confirmer.confirm_transfer(provider, from_user_id).await {
            info!("Transfer declined for {}", provider.as_str());
            return Ok(Resolution::to(Navigation::Account));
        }

        let token = self.store.access_token().ok_or(AuthError::SessionInvalid)?;
        match self
            .api
            .transfer_oauth(&token, provider, provider_user_id, from_user_id)
            .await
        {
            Ok(()) => {
                self.store.fetch_session(self.api.as_ref()).await?;
                info!("Transferred {} connection", provider.as_str());
                Ok(Resolution::to(Navigation::Account))
            }
            Err(err) => {
                warn!("Transfer failed: {err}");
                Ok(Resolution {
                    navigation: Navigation::Account,
                    notice: Some(err.to_string()),
                })
            }
        }
    }

    /// Unknown identity: with a live session this is "connect another
    /// provider to my account" (optional, not fatal); without one it is a
    /// fresh social signup carried forward as continuation parameters.
    async fn resolve_register(
        &self,
        provider: Provider,
        provider_user_id: String,
    ) -> Result<Resolution> {
        let Some(token) = self.store.access_token() else {
            return Ok(Resolution::to(Navigation::Signup {
                provider,
                provider_user_id,
            }));
        };

        match self
            .api
            .connect_oauth(&token, provider, &provider_user_id)
            .await
        {
            Ok(()) => {
                self.store.fetch_session(self.api.as_ref()).await?;
                info!("Connected {} to current account", provider.as_str());
                Ok(Resolution::to(Navigation::Account))
            }
            Err(err) => {
                warn!("Connect failed: {err}");
                Ok(Resolution {
                    navigation: Navigation::Account,
                    notice: Some(err.to_string()),
                })
            }
        }
    }
}

/// Releases an active provider connection from the current account.
///
/// The sole active login method may never be released; the rule applies to
/// every provider alike.
///
/// # Errors
/// `SessionInvalid` without a logged-in session, `Validation` for an
/// unknown connection or the last remaining login method.
pub async fn release_connection(
    api: &dyn AuthApi,
    store: &SessionStore,
    oauth_id: i64,
) -> Result<()> {
    let token = store.access_token().ok_or(AuthError::SessionInvalid)?;
    let user = store.user().ok_or(AuthError::SessionInvalid)?;

    let target_is_active = user
        .oauth_connections
        .iter()
        .any(|connection| connection.oauth_id == oauth_id && connection.is_active());
    if !target_is_active {
        return Err(AuthError::Validation("connection is not active"));
    }
    if user.active_connections().count() <= 1 {
        return Err(AuthError::Validation(
            "cannot release the only active login method",
        ));
    }

    api.release_oauth(&token, oauth_id).await?;
    store.fetch_session(api).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: &str) -> RawLoginOutcome {
        RawLoginOutcome {
            status: Some(status.to_string()),
            ..RawLoginOutcome::default()
        }
    }

    #[test]
    fn tokens_take_priority_over_status() {
        let outcome = CallbackOutcome::parse(&RawLoginOutcome {
            status: Some(STATUS_NEED_TRANSFER.to_string()),
            access_token: Some("a".to_string()),
            refresh_token: Some("r".to_string()),
            access_token_expires_in: Some(900),
            ..RawLoginOutcome::default()
        })
        .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Completed { .. }));
    }

    #[test]
    fn connect_mode_sets_link_mode() {
        let outcome = CallbackOutcome::parse(&RawLoginOutcome {
            mode: Some("connect".to_string()),
            access_token: Some("a".to_string()),
            refresh_token: Some("r".to_string()),
            ..RawLoginOutcome::default()
        })
        .unwrap();
        assert!(matches!(
            outcome,
            CallbackOutcome::Completed {
                mode: LinkMode::Connect,
                ..
            }
        ));
    }

    #[test]
    fn transfer_requires_all_three_fields() {
        let complete = RawLoginOutcome {
            provider: Some("google".to_string()),
            provider_user_id: Some("abc".to_string()),
            from_user_id: Some("user-1".to_string()),
            ..raw(STATUS_NEED_TRANSFER)
        };
        assert!(matches!(
            CallbackOutcome::parse(&complete).unwrap(),
            CallbackOutcome::NeedTransfer { .. }
        ));

        // Missing fromUserId falls through; with nothing else matching the
        // callback is invalid.
        let partial = RawLoginOutcome {
            provider: Some("google".to_string()),
            provider_user_id: Some("abc".to_string()),
            ..raw(STATUS_NEED_TRANSFER)
        };
        assert!(matches!(
            CallbackOutcome::parse(&partial),
            Err(AuthError::InvalidCallback)
        ));
    }

    #[test]
    fn partial_transfer_in_connect_mode_falls_back_to_account() {
        let partial = RawLoginOutcome {
            mode: Some("connect".to_string()),
            provider: Some("google".to_string()),
            ..raw(STATUS_NEED_TRANSFER)
        };
        assert_eq!(
            CallbackOutcome::parse(&partial).unwrap(),
            CallbackOutcome::ConnectFallback
        );
    }

    #[test]
    fn register_parses_provider_identity() {
        let outcome = CallbackOutcome::parse(&RawLoginOutcome {
            provider: Some("kakao".to_string()),
            provider_user_id: Some("kakao-7".to_string()),
            ..raw(STATUS_NEED_REGISTER)
        })
        .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::NeedRegister {
                provider: Provider::Kakao,
                provider_user_id: "kakao-7".to_string(),
            }
        );
    }

    #[test]
    fn login_without_tokens_is_defensive_noop() {
        assert_eq!(
            CallbackOutcome::parse(&raw(STATUS_LOGIN)).unwrap(),
            CallbackOutcome::LoginWithoutTokens
        );
    }

    #[test]
    fn missing_status_is_invalid() {
        assert!(matches!(
            CallbackOutcome::parse(&RawLoginOutcome::default()),
            Err(AuthError::InvalidCallback)
        ));
        assert!(matches!(
            CallbackOutcome::parse(&raw("UNKNOWN")),
            Err(AuthError::InvalidCallback)
        ));
    }

    #[test]
    fn empty_token_strings_do_not_count_as_tokens() {
        let outcome = RawLoginOutcome {
            access_token: Some(String::new()),
            refresh_token: Some(String::new()),
            ..raw(STATUS_LOGIN)
        };
        assert_eq!(
            CallbackOutcome::parse(&outcome).unwrap(),
            CallbackOutcome::LoginWithoutTokens
        );
    }
}
