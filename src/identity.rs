//! Identity (PASS) verification adapter.
//!
//! The external certification widget is callback-driven and makes no
//! single-delivery guarantee, so it is wrapped behind an async trait that
//! yields exactly one outcome, and the verifier enforces single-shot
//! semantics per initiation with an explicit in-flight flag. A successful
//! certification is exchanged for the verified phone number and the CI/DI
//! correlation identifiers, which live in a transient cache until the step
//! that consumes them (registration, password reset, phone change) takes
//! them out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};
use ulid::Ulid;

use crate::api::{AuthApi, PassVerification};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// What the certification widget reports back. `error_msg` is surfaced to
/// the user verbatim.
#[derive(Clone, Debug)]
pub struct CertifyOutcome {
    pub success: bool,
    pub imp_uid: Option<String>,
    pub error_msg: Option<String>,
}

/// Async wrapper the host implements over the provider-supplied widget.
/// The implementation must deliver exactly one outcome per call, whatever
/// the underlying callback mechanism does.
#[async_trait]
pub trait CertifyWidget: Send + Sync {
    async fn certify(&self, merchant_uid: &str) -> CertifyOutcome;
}

/// Parameters handed to the widget when certification starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificationRequest {
    pub imp_code: String,
    pub merchant_uid: String,
}

/// Session-scoped holding area for CI/DI between the verify step and the
/// step that consumes it. `take` consumes; abandonment calls `clear`.
#[derive(Clone, Debug, Default)]
pub struct VerificationCache {
    slot: Arc<Mutex<Option<PassVerification>>>,
}

impl VerificationCache {
    pub fn store(&self, verification: PassVerification) {
        *self.lock() = Some(verification);
    }

    /// Takes the cached verification, clearing the slot.
    #[must_use]
    pub fn take(&self) -> Option<PassVerification> {
        self.lock().take()
    }

    #[must_use]
    pub fn peek(&self) -> Option<PassVerification> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PassVerification>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct IdentityVerifier {
    api: Arc<dyn AuthApi>,
    imp_code: String,
    in_flight: AtomicBool,
    cache: VerificationCache,
}

impl IdentityVerifier {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, config: &AuthConfig) -> Self {
        Self {
            api,
            imp_code: config.pass_merchant_code().to_string(),
            in_flight: AtomicBool::new(false),
            cache: VerificationCache::default(),
        }
    }

    /// Begins a certification: a fresh merchant uid per initiation.
    #[must_use]
    pub fn start(&self) -> CertificationRequest {
        CertificationRequest {
            imp_code: self.imp_code.clone(),
            merchant_uid: format!("moyo-cert-{}", Ulid::new()),
        }
    }

    /// Runs one certification through the widget and exchanges the result
    /// for the verified phone/CI/DI, which is also cached for the
    /// consuming step.
    ///
    /// # Errors
    /// `Busy` while a certification is already running, `Adapter` with the
    /// provider's message when certification fails or reports no `imp_uid`.
    pub async fn verify(&self, widget: &dyn CertifyWidget) -> Result<PassVerification> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AuthError::Busy);
        }
        let result = self.run(widget).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, widget: &dyn CertifyWidget) -> Result<PassVerification> {
        let request = self.start();
        let outcome = widget.certify(&request.merchant_uid).await;

        if !outcome.success {
            let message = outcome
                .error_msg
                .unwrap_or_else(|| "identity certification was not completed".to_string());
            warn!("Certification failed: {message}");
            return Err(AuthError::Adapter(message));
        }
        let Some(imp_uid) = outcome.imp_uid.filter(|uid| !uid.is_empty()) else {
            return Err(AuthError::Adapter(
                "certification succeeded without an imp_uid".to_string(),
            ));
        };

        let verification = self.api.pass_verify(&imp_uid).await?;
        info!("Identity verified");
        self.cache.store(verification.clone());
        Ok(verification)
    }

    /// The CI/DI holding area shared with the consuming flows.
    #[must_use]
    pub fn cache(&self) -> VerificationCache {
        self.cache.clone()
    }
}
