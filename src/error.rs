//! Error taxonomy for the auth core.
//!
//! Local input problems (`Validation`) never reach the network. Server
//! rejections carry the server's message so the caller can surface it
//! verbatim. `AlreadyIssued` is recoverable by design: the backup-code
//! manager falls back to fetching the existing set.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed local input; no request was sent.
    #[error("{0}")]
    Validation(&'static str),
    /// The server rejected the operation (bad credentials, invalid code).
    #[error("{0}")]
    Rejected(String),
    /// Backup codes were already issued for this account.
    #[error("backup codes already issued")]
    AlreadyIssued,
    /// The OAuth callback carried no usable outcome.
    #[error("invalid oauth callback")]
    InvalidCallback,
    /// The callback was already resolved; a callback is single-use.
    #[error("oauth callback already resolved")]
    CallbackConsumed,
    /// Another invocation of the same operation is still in flight.
    #[error("operation already in progress")]
    Busy,
    /// The identity-verification provider reported failure.
    #[error("identity verification failed: {0}")]
    Adapter(String),
    /// The stored access token is stale or invalid; the session was cleared.
    #[error("session is no longer valid")]
    SessionInvalid,
    /// The request never completed (connect, timeout, DNS).
    #[error("request failed: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("invalid response body")]
    Decode(#[from] serde_json::Error),
}

impl AuthError {
    /// True when the caller may retry with corrected input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Rejected(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
