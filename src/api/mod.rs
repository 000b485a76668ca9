//! Wire types and the collaborator boundary for the Moyo auth API.
//!
//! Every flow in this crate talks to the backend through the [`AuthApi`]
//! trait; production code uses the [`http::HttpAuthApi`] implementation and
//! tests drive the flows with an in-memory mock. Response envelopes and
//! error payloads are normalized once, inside the implementation, so the
//! flows only ever see typed values or [`AuthError`](crate::AuthError).

pub mod http;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Social login providers supported by the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Kakao,
    Google,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kakao => "kakao",
            Self::Google => "google",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kakao" => Some(Self::Kakao),
            "google" => Some(Self::Google),
            _ => None,
        }
    }
}

/// Platform role of the authenticated user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// Server-issued bearer credential pair.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token must be refreshed.
    pub access_token_expires_in: u64,
}

/// A social identity attached to a platform account.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConnection {
    pub provider: Provider,
    pub oauth_id: i64,
    pub provider_user_id: String,
    /// Set once the connection has been released; `None` means active.
    pub release_date: Option<String>,
}

impl OAuthConnection {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release_date.is_none()
    }
}

/// Profile of the authenticated user as reported by `GET users/me`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub otp_enabled: bool,
    #[serde(default)]
    pub oauth_connections: Vec<OAuthConnection>,
}

impl UserProfile {
    /// Active (not yet released) social connections.
    pub fn active_connections(&self) -> impl Iterator<Item = &OAuthConnection> {
        self.oauth_connections
            .iter()
            .filter(|connection| connection.is_active())
    }
}

/// Secret and otpauth URL handed out when TOTP enrollment starts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSetup {
    pub otp_auth_url: String,
    pub secret: String,
    pub enabled: bool,
}

/// Backup recovery-code set as reported by the server.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodes {
    pub issued: bool,
    #[serde(default)]
    pub codes: Vec<String>,
}

/// Raw OAuth callback outcome as the server reports it, before it is parsed
/// into the [`CallbackOutcome`](crate::oauth::CallbackOutcome) sum type.
/// Fields overlap between variants on the wire; do not consume this directly.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawLoginOutcome {
    pub status: Option<String>,
    pub mode: Option<String>,
    pub provider: Option<String>,
    pub provider_user_id: Option<String>,
    pub from_user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_expires_in: Option<u64>,
}

impl RawLoginOutcome {
    /// Builds an outcome from a redirect callback URL. The server reports
    /// the same fields either in the code-exchange response body or as
    /// query parameters on the redirect.
    #[must_use]
    pub fn from_callback_url(url: &url::Url) -> Self {
        let mut outcome = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "status" => outcome.status = Some(value),
                "mode" => outcome.mode = Some(value),
                "provider" => outcome.provider = Some(value),
                "providerUserId" => outcome.provider_user_id = Some(value),
                "fromUserId" => outcome.from_user_id = Some(value),
                "accessToken" => outcome.access_token = Some(value),
                "refreshToken" => outcome.refresh_token = Some(value),
                "accessTokenExpiresIn" => {
                    outcome.access_token_expires_in = value.parse().ok();
                }
                _ => {}
            }
        }
        outcome
    }
}

/// Verified identity produced by the PASS certification provider.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PassVerification {
    pub phone: String,
    pub ci: String,
    pub di: String,
}

/// Collaborator boundary for every network-backed auth operation.
///
/// Authenticated operations take the access token explicitly; the
/// [`SessionStore`](crate::session::SessionStore) is the only place tokens
/// live between calls.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &SecretString, remember: bool)
        -> Result<TokenPair>;

    async fn exchange_oauth_code(&self, provider: Provider, code: &str)
        -> Result<RawLoginOutcome>;

    async fn transfer_oauth(
        &self,
        access_token: &str,
        provider: Provider,
        provider_user_id: &str,
        from_user_id: &str,
    ) -> Result<()>;

    async fn connect_oauth(
        &self,
        access_token: &str,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<()>;

    async fn release_oauth(&self, access_token: &str, oauth_id: i64) -> Result<()>;

    async fn me(&self, access_token: &str) -> Result<UserProfile>;

    async fn otp_setup(&self, access_token: &str) -> Result<OtpSetup>;

    async fn otp_verify(&self, access_token: &str, code: &str) -> Result<()>;

    async fn otp_disable_verify(&self, access_token: &str, code: &str) -> Result<()>;

    async fn backup_list(&self, access_token: &str) -> Result<BackupCodes>;

    /// May fail with [`AuthError::AlreadyIssued`](crate::AuthError::AlreadyIssued).
    async fn backup_issue(&self, access_token: &str) -> Result<Vec<String>>;

    async fn pass_verify(&self, imp_uid: &str) -> Result<PassVerification>;
}
