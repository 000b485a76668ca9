//! Backup recovery codes: one-time issuance and idempotent re-viewing.
//!
//! Issuance happens at most once per account. Once `issued` is set it never
//! reverts, with a single exception: a successful issue call that returns no
//! codes is a server anomaly and forces `issued` back to `false` rather than
//! trusting it. When the server reports the already-issued conflict, the
//! manager falls back to fetching the existing set, so issuance is
//! idempotent from the caller's point of view.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::api::AuthApi;
use crate::error::{AuthError, Result};
use crate::session::SessionStore;

#[derive(Debug, Default)]
struct BackupState {
    codes: Vec<String>,
    issued: bool,
    viewer_open: bool,
    loading: bool,
}

pub struct BackupCodeManager {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    state: Mutex<BackupState>,
}

impl BackupCodeManager {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        Self {
            api,
            store,
            state: Mutex::new(BackupState::default()),
        }
    }

    /// Issues the backup-code set and opens the viewer.
    ///
    /// When the set was already issued (locally known or reported by the
    /// server) no second issue request is made; the existing set is fetched
    /// instead and the caller cannot tell the difference.
    ///
    /// # Errors
    /// `Busy` while another request is in flight, `Rejected` when the server
    /// returns an empty set.
    pub async fn issue(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.loading {
                return Err(AuthError::Busy);
            }
            if state.issued {
                drop(state);
                return self.fetch_existing().await;
            }
            state.loading = true;
        }

        let Some(token) = self.store.access_token() else {
            self.lock().loading = false;
            return Err(AuthError::SessionInvalid);
        };

        match self.api.backup_issue(&token).await {
            Ok(codes) if !codes.is_empty() => {
                let mut state = self.lock();
                state.codes = codes;
                state.issued = true;
                state.viewer_open = true;
                state.loading = false;
                info!("Backup codes issued");
                Ok(())
            }
            Ok(_) => {
                // Issue "succeeded" with nothing to show; do not trust it.
                let mut state = self.lock();
                state.issued = false;
                state.loading = false;
                warn!("Backup issue returned an empty code list");
                Err(AuthError::Rejected(
                    "backup codes could not be issued; please try again".to_string(),
                ))
            }
            Err(AuthError::AlreadyIssued) => {
                {
                    let mut state = self.lock();
                    state.issued = true;
                    state.loading = false;
                }
                info!("Backup codes already issued; fetching existing set");
                self.fetch_existing().await
            }
            Err(err) => {
                self.lock().loading = false;
                Err(err)
            }
        }
    }

    /// Fetches the previously issued set and opens the viewer.
    ///
    /// # Errors
    /// `Busy` while another request is in flight.
    pub async fn fetch_existing(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.loading {
                return Err(AuthError::Busy);
            }
            state.loading = true;
        }

        let Some(token) = self.store.access_token() else {
            self.lock().loading = false;
            return Err(AuthError::SessionInvalid);
        };

        match self.api.backup_list(&token).await {
            Ok(set) => {
                let mut state = self.lock();
                state.codes = set.codes;
                state.issued = set.issued;
                state.viewer_open = true;
                state.loading = false;
                Ok(())
            }
            Err(err) => {
                self.lock().loading = false;
                Err(err)
            }
        }
    }

    /// Newline-joined codes for the clipboard; `None` when nothing is cached.
    #[must_use]
    pub fn clipboard_text(&self) -> Option<String> {
        let state = self.lock();
        if state.codes.is_empty() {
            None
        } else {
            Some(state.codes.join("\n"))
        }
    }

    /// Plain-text export body; `None` when nothing is cached.
    #[must_use]
    pub fn txt_export(&self) -> Option<String> {
        self.clipboard_text().map(|text| text + "\n")
    }

    /// Writes the export to a file. No-op when nothing is cached.
    ///
    /// # Errors
    /// `Transport` when the file cannot be written.
    pub fn write_txt(&self, path: &Path) -> Result<()> {
        let Some(body) = self.txt_export() else {
            return Ok(());
        };
        std::fs::write(path, body).map_err(|err| AuthError::Transport(err.to_string()))
    }

    /// Closes the viewer and drops the in-memory code cache.
    pub fn close(&self) {
        let mut state = self.lock();
        state.viewer_open = false;
        state.codes.clear();
    }

    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        self.lock().codes.clone()
    }

    #[must_use]
    pub fn is_issued(&self) -> bool {
        self.lock().issued
    }

    #[must_use]
    pub fn is_viewer_open(&self) -> bool {
        self.lock().viewer_open
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    fn lock(&self) -> MutexGuard<'_, BackupState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
