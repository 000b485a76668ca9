//! Identity and session management core for the Moyo subscription-sharing
//! service.
//!
//! The crate owns the authentication state machine and nothing else: the
//! session store, credential and provider login, the OAuth linking/transfer
//! callback resolver, TOTP second-factor enrollment, backup recovery codes,
//! and the PASS identity-verification boundary. Transport and rendering are
//! the host's concern; the backend is reached through the [`api::AuthApi`]
//! trait and routing decisions come back as [`oauth::Navigation`] values.

pub mod api;
pub mod backup;
pub mod config;
pub mod error;
pub mod identity;
pub mod login;
pub mod oauth;
pub mod otp;
pub mod session;

pub use api::{AuthApi, Provider, Role, TokenPair, UserProfile};
pub use backup::BackupCodeManager;
pub use config::AuthConfig;
pub use error::{AuthError, Result};
pub use identity::{CertifyWidget, IdentityVerifier, VerificationCache};
pub use login::LoginFlow;
pub use oauth::{CallbackResolver, Navigation, Resolution, TransferConfirmer};
pub use otp::{OtpManager, OtpMode};
pub use session::{Session, SessionStore};
