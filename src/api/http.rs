//! `reqwest`-backed implementation of [`AuthApi`].
//!
//! All requests share one timeout policy and one normalization point: the
//! backend wraps payloads in an envelope whose `success`/`message` fields
//! have moved around between API revisions, so the envelope is unwrapped
//! here and nowhere else. Flows never see a raw response body.

use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::{
    AuthApi, BackupCodes, OtpSetup, PassVerification, Provider, RawLoginOutcome, TokenPair,
    UserProfile,
};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Error code the server uses when backup codes were already issued.
const CODE_BACKUP_ALREADY_ISSUED: &str = "BACKUP_CODES_ALREADY_ISSUED";

pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    /// Returns `Transport` if the underlying client cannot be constructed.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
        body: Option<&B>,
    ) -> Result<Value> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            error!("Request to {path} failed: {err}");
            AuthError::Transport(err.to_string())
        })?;

        let status = response.status();
        let payload: Value = match response.json().await {
            Ok(value) => value,
            // Some success responses carry no body at all.
            Err(_) if status.is_success() => Value::Null,
            Err(err) => return Err(AuthError::Transport(err.to_string())),
        };

        if status.is_success() {
            debug!("Request to {path} succeeded");
            return accept(path, payload);
        }
        Err(reject(path, status, &payload))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, access_token: &str) -> Result<T> {
        let value = self
            .send::<Value>(Method::GET, path, Some(access_token), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn post_empty<B: Serialize>(
        &self,
        path: &str,
        access_token: &str,
        body: &B,
    ) -> Result<()> {
        self.send(Method::POST, path, Some(access_token), Some(body))
            .await?;
        Ok(())
    }
}

/// Applies the body-level `success` flag, then strips the envelope. Some
/// endpoints report failure as `success: false` inside a 2xx response.
fn accept(path: &str, payload: Value) -> Result<Value> {
    if !envelope_success(&payload) {
        let message =
            extract_message(&payload).unwrap_or_else(|| "request rejected".to_string());
        error!("Request to {path} rejected in body: {message}");
        return Err(AuthError::Rejected(message));
    }
    Ok(unwrap_envelope(payload))
}

/// Reads `success` from the top level or nested under `data`; absent means
/// the endpoint predates the envelope and the status code is authoritative.
fn envelope_success(payload: &Value) -> bool {
    payload
        .get("success")
        .or_else(|| payload.get("data").and_then(|data| data.get("success")))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Unwraps the `{ success, data, message }` envelope when present; older
/// endpoints return the payload bare.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Pulls a user-facing message out of whichever slot the server used.
fn extract_message(payload: &Value) -> Option<String> {
    for path in [
        &["message"][..],
        &["error", "message"][..],
        &["data", "message"][..],
        &["error"][..],
    ] {
        let mut current = payload;
        for key in path {
            current = current.get(key)?;
        }
        if let Some(text) = current.as_str() {
            return Some(text.to_string());
        }
    }
    None
}

fn extract_code(payload: &Value) -> Option<&str> {
    payload
        .get("code")
        .or_else(|| payload.get("error").and_then(|e| e.get("code")))
        .or_else(|| payload.get("data").and_then(|d| d.get("code")))
        .and_then(Value::as_str)
}

fn reject(path: &str, status: StatusCode, payload: &Value) -> AuthError {
    if extract_code(payload) == Some(CODE_BACKUP_ALREADY_ISSUED) {
        return AuthError::AlreadyIssued;
    }
    if status == StatusCode::UNAUTHORIZED {
        return AuthError::SessionInvalid;
    }
    let message =
        extract_message(payload).unwrap_or_else(|| format!("request failed ({status})"));
    error!("Request to {path} rejected ({status}): {message}");
    AuthError::Rejected(message)
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
        remember: bool,
    ) -> Result<TokenPair> {
        let body = json!({
            "userId": email,
            "password": password.expose_secret(),
            "remember": remember,
        });
        let value = self
            .send(Method::POST, "/auth/login", None, Some(&body))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn exchange_oauth_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<RawLoginOutcome> {
        let body = json!({ "provider": provider.as_str(), "code": code });
        let value = self
            .send(Method::POST, "/auth/oauth/callback", None, Some(&body))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn transfer_oauth(
        &self,
        access_token: &str,
        provider: Provider,
        provider_user_id: &str,
        from_user_id: &str,
    ) -> Result<()> {
        let body = json!({
            "provider": provider.as_str(),
            "providerUserId": provider_user_id,
            "fromUserId": from_user_id,
        });
        self.post_empty("/auth/oauth/transfer", access_token, &body)
            .await
    }

    async fn connect_oauth(
        &self,
        access_token: &str,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<()> {
        let body = json!({
            "provider": provider.as_str(),
            "providerUserId": provider_user_id,
        });
        self.post_empty("/auth/oauth/connect", access_token, &body)
            .await
    }

    async fn release_oauth(&self, access_token: &str, oauth_id: i64) -> Result<()> {
        let body = json!({ "oauthId": oauth_id });
        self.post_empty("/auth/oauth/release", access_token, &body)
            .await
    }

    async fn me(&self, access_token: &str) -> Result<UserProfile> {
        self.get_json("/users/me", access_token).await
    }

    async fn otp_setup(&self, access_token: &str) -> Result<OtpSetup> {
        self.get_json("/auth/otp/setup", access_token).await
    }

    async fn otp_verify(&self, access_token: &str, code: &str) -> Result<()> {
        let body = json!({ "code": code });
        self.post_empty("/auth/otp/verify", access_token, &body).await
    }

    async fn otp_disable_verify(&self, access_token: &str, code: &str) -> Result<()> {
        let body = json!({ "code": code });
        self.post_empty("/auth/otp/disable/verify", access_token, &body)
            .await
    }

    async fn backup_list(&self, access_token: &str) -> Result<BackupCodes> {
        self.get_json("/auth/otp/backup/list", access_token).await
    }

    async fn backup_issue(&self, access_token: &str) -> Result<Vec<String>> {
        let value = self
            .send(Method::POST, "/auth/otp/backup/issue", Some(access_token), Some(&json!({})))
            .await?;
        let codes: BackupCodes = serde_json::from_value(value)?;
        Ok(codes.codes)
    }

    async fn pass_verify(&self, imp_uid: &str) -> Result<PassVerification> {
        let body = json!({ "impUid": imp_uid });
        let value = self
            .send(Method::POST, "/auth/pass/verify", None, Some(&body))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}
