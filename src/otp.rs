//! Second-factor (TOTP) enrollment and disablement.
//!
//! The dialog state machine: `Closed → AwaitingCode(enable)` via a server
//! round-trip that hands out the secret and QR, or `Closed →
//! AwaitingCode(disable)` locally. Confirmation dispatches to the matching
//! verify endpoint and resets to `Closed` on success. Every open or reset
//! bumps an epoch; a response that comes back for an older epoch is dropped,
//! so a late disable-verify result cannot flip state for a newer enable flow.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::api::AuthApi;
use crate::error::{AuthError, Result};
use crate::session::SessionStore;

const OTP_CODE_LEN: usize = 6;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OtpMode {
    Enable,
    Disable,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
    Closed,
    AwaitingCode,
}

#[derive(Debug)]
struct OtpState {
    stage: Stage,
    mode: OtpMode,
    secret: Option<String>,
    qr_url: Option<String>,
    code: String,
    loading: bool,
    enabled: bool,
    epoch: u64,
}

impl OtpState {
    fn reset(&mut self) {
        self.stage = Stage::Closed;
        self.secret = None;
        self.qr_url = None;
        self.code.clear();
        self.loading = false;
        self.epoch += 1;
    }
}

pub struct OtpManager {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    state: Mutex<OtpState>,
}

impl OtpManager {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        let enabled = store.user().is_some_and(|user| user.otp_enabled);
        Self {
            api,
            store,
            state: Mutex::new(OtpState {
                stage: Stage::Closed,
                mode: OtpMode::Enable,
                secret: None,
                qr_url: None,
                code: String::new(),
                loading: false,
                enabled,
                epoch: 0,
            }),
        }
    }

    /// Requests a secret/QR pair and opens the enable dialog.
    ///
    /// # Errors
    /// `Busy` when a dialog is already open or a request is in flight.
    pub async fn open_setup(&self) -> Result<()> {
        let epoch = {
            let mut state = self.lock();
            if state.loading || state.stage != Stage::Closed {
                return Err(AuthError::Busy);
            }
            state.loading = true;
            state.epoch += 1;
            state.epoch
        };

        let Some(token) = self.store.access_token() else {
            self.lock().loading = false;
            return Err(AuthError::SessionInvalid);
        };

        match self.api.otp_setup(&token).await {
            Ok(setup) => {
                let mut state = self.lock();
                if state.epoch != epoch {
                    // Dialog was cancelled while the request was in flight.
                    return Ok(());
                }
                state.mode = OtpMode::Enable;
                state.stage = Stage::AwaitingCode;
                state.secret = Some(setup.secret);
                state.qr_url = Some(setup.otp_auth_url);
                state.enabled = setup.enabled;
                state.loading = false;
                Ok(())
            }
            Err(err) => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.loading = false;
                }
                Err(err)
            }
        }
    }

    /// Opens the disable dialog. Local only; the server round-trip happens
    /// at confirmation.
    ///
    /// # Errors
    /// `Busy` when a dialog is already open or a request is in flight.
    pub fn prepare_disable(&self) -> Result<()> {
        let mut state = self.lock();
        if state.loading || state.stage != Stage::Closed {
            return Err(AuthError::Busy);
        }
        // Stale QR/secret from an abandoned enable flow must not linger.
        state.secret = None;
        state.qr_url = None;
        state.code.clear();
        state.mode = OtpMode::Disable;
        state.stage = Stage::AwaitingCode;
        state.epoch += 1;
        Ok(())
    }

    /// Replaces the code buffer with at most six digits from `raw`.
    /// Completeness is checked at confirmation, not here.
    pub fn change_code(&self, raw: &str) {
        self.lock().code = sanitize_code(raw);
    }

    /// Verifies the entered code against the endpoint for the current mode.
    /// On success the profile is refreshed so `otp_enabled` reflects server
    /// truth and the dialog closes; on rejection the dialog stays open with
    /// the code preserved for inspection.
    ///
    /// # Errors
    /// `Validation` when no dialog is open or the code is incomplete (no
    /// request is sent), `Rejected` with the server message on a bad code.
    pub async fn confirm(&self) -> Result<()> {
        let (mode, code, epoch) = {
            let mut state = self.lock();
            if state.loading {
                return Err(AuthError::Busy);
            }
            if state.stage != Stage::AwaitingCode {
                return Err(AuthError::Validation("no OTP dialog open"));
            }
            if state.code.len() != OTP_CODE_LEN {
                return Err(AuthError::Validation("enter the 6-digit code"));
            }
            state.loading = true;
            (state.mode, state.code.clone(), state.epoch)
        };

        let Some(token) = self.store.access_token() else {
            self.lock().loading = false;
            return Err(AuthError::SessionInvalid);
        };

        let verify = match mode {
            OtpMode::Enable => self.api.otp_verify(&token, &code).await,
            OtpMode::Disable => self.api.otp_disable_verify(&token, &code).await,
        };

        match verify {
            Ok(()) => {
                if let Err(err) = self.store.fetch_session(self.api.as_ref()).await {
                    warn!("Profile refresh after OTP change failed: {err}");
                }
                let mut state = self.lock();
                if state.epoch != epoch {
                    return Ok(());
                }
                state.enabled = mode == OtpMode::Enable;
                state.reset();
                info!(
                    "OTP {}",
                    if mode == OtpMode::Enable { "enabled" } else { "disabled" }
                );
                Ok(())
            }
            Err(err) => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    // Stay in AwaitingCode; the user retries with a new code.
                    state.loading = false;
                }
                Err(err)
            }
        }
    }

    /// Closes the dialog and discards local state. An in-flight request is
    /// allowed to finish; its result is dropped by the epoch check.
    pub fn cancel(&self) {
        self.lock().reset();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().stage == Stage::AwaitingCode
    }

    #[must_use]
    pub fn mode(&self) -> OtpMode {
        self.lock().mode
    }

    #[must_use]
    pub fn secret(&self) -> Option<String> {
        self.lock().secret.clone()
    }

    #[must_use]
    pub fn qr_url(&self) -> Option<String> {
        self.lock().qr_url.clone()
    }

    #[must_use]
    pub fn code(&self) -> String {
        self.lock().code.clone()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    fn lock(&self) -> MutexGuard<'_, OtpState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn sanitize_code(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(OTP_CODE_LEN)
        .collect()
}
